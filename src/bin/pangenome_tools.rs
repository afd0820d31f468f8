use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use pangenomer::cli;
use pangenomer::functions::{
    CladePaths, Domain, FunctionTable, GenomeUpaMap, attach_representatives, merge_functions,
    read_clades, read_id_list, read_rep_seqs, target_genome_ids,
};
use pangenomer::pangenome::{ClusterCategory, PangenomeObject, read_pangenome, write_pangenome};
use pangenomer::postprocess::{
    ChunkRange, ClusterField, chunk, chunk_output_path, chunk_ranges, ensure_new_file,
    sibling_path, split_by_category, split_output_path, strip_field,
};
use pangenomer::tsv::{IdMap, open_text};

#[derive(Parser)]
#[command(name = "pangenome_tools", about = "Reshape and annotate pangenome JSON documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the core and accessory clusters to separate documents
    Split {
        /// Input pangenome JSON
        #[arg(short = 'i', long = "input", value_parser = cli::nonempty_file)]
        input: PathBuf,
    },
    /// Write consecutive ranges of clusters to separate documents
    Chunk {
        /// Input pangenome JSON
        #[arg(short = 'i', long = "input", value_parser = cli::nonempty_file)]
        input: PathBuf,

        /// Cluster range start:stop (0-based, stop exclusive), repeatable
        #[arg(long = "range", required_unless_present = "chunk_size", conflicts_with = "chunk_size")]
        ranges: Vec<ChunkRange>,

        /// Number of clusters per chunk
        #[arg(long = "chunk-size")]
        chunk_size: Option<usize>,
    },
    /// Reset cluster fields to their empty values
    Strip {
        /// Input pangenome JSON
        #[arg(short = 'i', long = "input", value_parser = cli::nonempty_file)]
        input: PathBuf,

        /// Field to reset, repeatable
        #[arg(long = "field", required = true)]
        fields: Vec<ClusterField>,

        /// Output pangenome JSON [default: <input>-stripped.json]
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,
    },
    /// Merge function annotations from function tables into clade pangenomes
    AddFunctions {
        #[command(flatten)]
        clades: CladeArgs,

        /// Taxonomic domain selecting the function tables (bacteria or archaea)
        #[arg(long = "domain", default_value = "bacteria")]
        domain: Domain,

        /// Genome IDs whose annotations are used, one per line
        #[arg(long = "preferred", value_parser = cli::nonempty_file)]
        preferred: PathBuf,

        /// Directory searched recursively for function table files
        #[arg(long = "function-dir", value_parser = cli::existing_dir)]
        function_dir: PathBuf,
    },
    /// Set each cluster's protein translation from its representative sequence
    AddProteins {
        #[command(flatten)]
        clades: CladeArgs,
    },
}

#[derive(Args)]
struct CladeArgs {
    /// Clades file with `count lineage` rows
    #[arg(long = "clades", value_parser = cli::nonempty_file, required_unless_present = "clade")]
    clades_file: Option<PathBuf>,

    /// Clade name, repeatable
    #[arg(long = "clade")]
    clade: Vec<String>,

    /// Directory holding one subdirectory per clade
    #[arg(long = "base-dir", value_parser = cli::existing_dir)]
    base_dir: PathBuf,

    /// Genome ID to object reference map
    #[arg(long = "genome-upa-map", value_parser = cli::nonempty_file)]
    genome_upa_map: PathBuf,
}

impl CladeArgs {
    fn clade_paths(&self) -> Result<Vec<CladePaths>> {
        let mut names = self.clade.clone();
        if let Some(path) = &self.clades_file {
            let listed = read_clades(open_text(path)?)
                .with_context(|| format!("invalid clades file: {}", path.display()))?;
            names.extend(listed);
        }
        if names.is_empty() {
            bail!("no clades given");
        }
        Ok(names.iter().map(|c| CladePaths::new(&self.base_dir, c)).collect())
    }
}

fn write_output(input: &Path, output: &Path, pangenome: &PangenomeObject) -> Result<()> {
    ensure_new_file(input, output)?;
    write_pangenome(output, pangenome)?;
    cli::success(&format!(
        "{} ({} clusters)",
        output.display(),
        pangenome.orthologs.len()
    ));
    Ok(())
}

fn split(input: &Path) -> Result<()> {
    let pangenome = read_pangenome(input)?;
    for category in [ClusterCategory::Core, ClusterCategory::Accessory] {
        let subset = split_by_category(&pangenome, category);
        write_output(input, &split_output_path(input, category), &subset)?;
    }
    Ok(())
}

fn chunk_file(input: &Path, ranges: Vec<ChunkRange>, chunk_size: Option<usize>) -> Result<()> {
    let pangenome = read_pangenome(input)?;
    let ranges = match chunk_size {
        Some(size) => chunk_ranges(pangenome.orthologs.len(), size)?,
        None => ranges,
    };
    cli::kv("Clusters", &pangenome.orthologs.len().to_string());
    cli::kv("Chunks", &ranges.len().to_string());
    for (i, range) in ranges.into_iter().enumerate() {
        if range.start >= pangenome.orthologs.len() {
            cli::warning(&format!("range {range} starts past the last cluster"));
        }
        let part = chunk(&pangenome, range);
        write_output(input, &chunk_output_path(input, i + 1), &part)?;
    }
    Ok(())
}

fn strip(input: &Path, fields: &[ClusterField], out: Option<PathBuf>) -> Result<()> {
    let mut pangenome = read_pangenome(input)?;
    for &field in fields {
        strip_field(&mut pangenome, field);
        cli::kv("Stripped", field.as_str());
    }
    let output = out.unwrap_or_else(|| sibling_path(input, "-stripped"));
    write_output(input, &output, &pangenome)
}

/// Reads every clade pangenome and the genome reference map restricted to
/// their genomes.
fn load_clades(
    paths: &[CladePaths],
    input: fn(&CladePaths) -> PathBuf,
    upa_map: &Path,
) -> Result<(Vec<PangenomeObject>, GenomeUpaMap)> {
    let pangenomes = paths
        .iter()
        .map(|p| read_pangenome(&input(p)))
        .collect::<Result<Vec<_>, _>>()?;
    let targets = target_genome_ids(&pangenomes);
    let upas = GenomeUpaMap::from_file(upa_map, &targets)?;
    cli::kv("Clades", &paths.len().to_string());
    cli::kv("Genomes", &format!("{} ({} with references)", targets.len(), upas.len()));
    Ok((pangenomes, upas))
}

fn add_functions(
    clades: &CladeArgs,
    domain: Domain,
    preferred: &Path,
    function_dir: &Path,
) -> Result<()> {
    let paths = clades.clade_paths()?;
    let (pangenomes, upas) = load_clades(&paths, CladePaths::pangenome, &clades.genome_upa_map)?;
    let preferred = read_id_list(open_text(preferred)?)?;
    cli::kv("Preferred genomes", &preferred.len().to_string());

    let (table, files) = FunctionTable::load_dir(function_dir, domain, &upas)?;
    if files.is_empty() {
        bail!(
            "no {} function tables found under {}",
            domain.file_prefix(),
            function_dir.display()
        );
    }
    cli::kv("Function tables", &files.len().to_string());
    cli::kv("Annotated genomes", &table.genome_count().to_string());
    eprintln!();

    for (clade, mut pangenome) in paths.iter().zip(pangenomes) {
        merge_functions(&mut pangenome, &table, &preferred, &upas)
            .with_context(|| format!("failed to merge functions for {}", clade.clade()))?;
        write_output(&clade.pangenome(), &clade.with_functions(), &pangenome)?;
    }
    Ok(())
}

fn add_proteins(clades: &CladeArgs) -> Result<()> {
    let paths = clades.clade_paths()?;
    let (pangenomes, upas) =
        load_clades(&paths, CladePaths::with_functions, &clades.genome_upa_map)?;
    eprintln!();

    for (clade, mut pangenome) in paths.iter().zip(pangenomes) {
        let rep_seqs = read_rep_seqs(&clade.rep_seqs())?;
        let gene_id_map = IdMap::from_file("gene ID map", &clade.gene_id_map())?;
        attach_representatives(&mut pangenome, &rep_seqs, &gene_id_map, &upas)
            .with_context(|| format!("failed to attach proteins for {}", clade.clade()))?;
        write_output(&clade.with_functions(), &clade.with_proteins(), &pangenome)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let start = Instant::now();
    let cli_args = Cli::parse();

    cli::banner("Pangenome Tools");

    match cli_args.command {
        Command::Split { input } => {
            cli::section("Split");
            split(&input)?;
        }
        Command::Chunk {
            input,
            ranges,
            chunk_size,
        } => {
            cli::section("Chunk");
            chunk_file(&input, ranges, chunk_size)?;
        }
        Command::Strip { input, fields, out } => {
            cli::section("Strip");
            strip(&input, &fields, out)?;
        }
        Command::AddFunctions {
            clades,
            domain,
            preferred,
            function_dir,
        } => {
            cli::section("Add Functions");
            add_functions(&clades, domain, &preferred, &function_dir)?;
        }
        Command::AddProteins { clades } => {
            cli::section("Add Proteins");
            add_proteins(&clades)?;
        }
    }

    cli::print_summary(start);
    Ok(())
}
