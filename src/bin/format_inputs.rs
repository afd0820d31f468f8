use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use pangenomer::cli;
use pangenomer::format::{FormatOutputs, QualityTable, format_inputs, read_faa_list};
use pangenomer::tsv::open_text;

#[derive(Parser)]
#[command(
    name = "format_inputs",
    about = "Concatenate per-genome protein FASTA files with generated gene IDs"
)]
struct Cli {
    /// File listing one protein FASTA path per line
    #[arg(short = 'f', long = "faa-list", value_parser = cli::nonempty_file)]
    faa_list: PathBuf,

    /// Quality table: genome ID, completeness, contamination
    #[arg(short = 'c', long = "checkm", value_parser = cli::nonempty_file)]
    checkm: PathBuf,

    /// Output concatenated protein FASTA
    #[arg(short = 'm', long = "out-faa")]
    out_faa: PathBuf,

    /// Output quality table for the listed genomes
    #[arg(short = 'q', long = "out-checkm")]
    out_checkm: PathBuf,

    /// Output generated-to-original gene ID map
    #[arg(short = 'g', long = "out-gene-id-map")]
    out_gene_id_map: PathBuf,
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();

    cli::banner("Format Inputs");

    // ── Inputs ───────────────────────────────────────────
    cli::section("Inputs");

    let faa_files = read_faa_list(open_text(&cli_args.faa_list)?)
        .with_context(|| format!("invalid FASTA list: {}", cli_args.faa_list.display()))?;
    let quality = QualityTable::from_file(&cli_args.checkm)?;

    cli::kv("FASTA list", &cli_args.faa_list.display().to_string());
    cli::kv("Genomes", &faa_files.len().to_string());
    cli::kv("Quality rows", &quality.len().to_string());

    eprintln!();

    // ── Formatting ───────────────────────────────────────
    cli::section("Formatting");

    let outputs = FormatOutputs {
        faa: cli_args.out_faa,
        quality: cli_args.out_checkm,
        id_map: cli_args.out_gene_id_map,
    };
    let summary = format_inputs(&faa_files, &quality, &outputs)?;

    cli::success(&format!(
        "{} genes from {} genomes",
        summary.genes, summary.genomes
    ));
    cli::kv("FASTA", &outputs.faa.display().to_string());
    cli::kv("Quality", &outputs.quality.display().to_string());
    cli::kv("Gene ID map", &outputs.id_map.display().to_string());

    cli::print_summary(start);
    Ok(())
}
