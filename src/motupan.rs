//! Completeness estimation with mOTUpan: input conversion, the estimator run
//! and parsing of its tabular output.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::format::QUALITY_HEADER;
use crate::mmseqs::ClusterOutputs;
use crate::pangenome::ClusterCategory;
use crate::runner::{StageStatus, ToolCommand, run_memoized};
use crate::tsv::open_text;

const VERSION_PREFIX: &str = "#mOTUlizer:mOTUpan:";
const RUN_NAME_PREFIX: &str = "#run_name=";
const GENOME_COUNT_PREFIX: &str = "#genome_count=";
const CORE_LENGTH_PREFIX: &str = "#core_length=";
const GENOME_SIZE_PREFIX: &str = "#mean_est_genome_size=";
const GENOMES_PREFIX: &str = "#genomes=";

/// Estimator input built from the cluster table: `<prefix>-motupan_in.json`.
pub fn converted_clusters_path(run_dir: &Path, clusters: &ClusterOutputs) -> PathBuf {
    run_dir.join(format!("{}-motupan_in.json", clusters.prefix))
}

/// Estimator output: `<stem>-pangenome.mOTUpan`.
pub fn estimator_output_path(run_dir: &Path, stem: &str) -> PathBuf {
    run_dir.join(format!("{stem}-pangenome.mOTUpan"))
}

pub fn convert_command(motuconvert: &Path, clusters: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new(motuconvert)
        .args(["--in_type", "mmseqs2", "-o"])
        .arg(output.display().to_string())
        .arg(clusters.display().to_string())
}

pub fn estimate_command(motupan: &Path, converted: &Path, quality: &Path, max_iter: u32, output: &Path) -> ToolCommand {
    ToolCommand::new(motupan)
        .arg("--gene_clusters_file")
        .arg(converted.display().to_string())
        .arg("--checkm")
        .arg(quality.display().to_string())
        .arg("--max_iter")
        .arg(max_iter.to_string())
        .arg("--output")
        .arg(output.display().to_string())
}

/// Converts the cluster table into the estimator's JSON input.
pub fn run_convert(
    motuconvert: &Path,
    run_dir: &Path,
    clusters: &ClusterOutputs,
    force_redo: bool,
    sink: &mut dyn FnMut(&str),
) -> Result<(PathBuf, StageStatus), Error> {
    let output = converted_clusters_path(run_dir, clusters);
    let cmd = convert_command(motuconvert, &clusters.clusters, &output);
    let status = run_memoized(&cmd, run_dir, &output, force_redo, sink)?;
    Ok((output, status))
}

/// Runs the estimator over converted clusters and a quality table.
#[allow(clippy::too_many_arguments)]
pub fn run_estimator(
    motupan: &Path,
    run_dir: &Path,
    stem: &str,
    converted: &Path,
    quality: &Path,
    max_iter: u32,
    force_redo: bool,
    sink: &mut dyn FnMut(&str),
) -> Result<(PathBuf, StageStatus), Error> {
    let output = estimator_output_path(run_dir, stem);
    let cmd = estimate_command(motupan, converted, quality, max_iter, &output);
    let status = run_memoized(&cmd, run_dir, &output, force_redo, sink)?;
    Ok((output, status))
}

/// Prior and posterior completeness of one genome. The posterior is also kept
/// as written so it can be passed on unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeCompleteness {
    pub genome_id: String,
    pub prior: f64,
    pub posterior: f64,
    pub posterior_text: String,
}

/// One cluster row of the estimator table.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorRow {
    pub cluster_id: String,
    pub category: ClusterCategory,
    pub genome_occurrence_count: u32,
    pub core_log_likelihood: f64,
    pub raw_mean_copies: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorOutput {
    pub type_ver: String,
    pub run_name: String,
    pub genome_count: u32,
    pub core_length: u64,
    pub mean_est_genome_size: f64,
    pub genomes: Vec<GenomeCompleteness>,
    pub rows: Vec<EstimatorRow>,
}

#[derive(Default)]
struct Headers {
    type_ver: Option<String>,
    run_name: Option<String>,
    genome_count: Option<u32>,
    core_length: Option<u64>,
    mean_est_genome_size: Option<f64>,
    genomes: Option<Vec<GenomeCompleteness>>,
}

impl EstimatorOutput {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        Self::parse(open_text(path)?)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut headers = Headers::default();
        let mut rows = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with("trait_name") {
                continue;
            }
            if line.starts_with('#') {
                parse_header(line, &mut headers)?;
                continue;
            }
            rows.push(parse_row(line)?);
        }

        let missing = |name: &str| Error::Parse(format!("estimator output has no {name} header"));
        Ok(Self {
            type_ver: headers.type_ver.ok_or_else(|| missing("version"))?,
            run_name: headers.run_name.ok_or_else(|| missing("run_name"))?,
            genome_count: headers.genome_count.ok_or_else(|| missing("genome_count"))?,
            core_length: headers.core_length.ok_or_else(|| missing("core_length"))?,
            mean_est_genome_size: headers
                .mean_est_genome_size
                .ok_or_else(|| missing("mean_est_genome_size"))?,
            genomes: headers.genomes.ok_or_else(|| missing("genomes"))?,
            rows,
        })
    }

    pub fn prior_completeness(&self) -> BTreeMap<String, f64> {
        self.genomes
            .iter()
            .map(|g| (g.genome_id.clone(), g.prior))
            .collect()
    }

    pub fn posterior_completeness(&self) -> BTreeMap<String, f64> {
        self.genomes
            .iter()
            .map(|g| (g.genome_id.clone(), g.posterior))
            .collect()
    }

    /// Genome IDs in sorted order.
    pub fn genome_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.genomes.iter().map(|g| g.genome_id.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

fn header_value<T: std::str::FromStr>(line: &str, prefix: &str) -> Result<T, Error> {
    let value = &line[prefix.len()..];
    value
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid value in header line: {line}")))
}

fn parse_header(line: &str, headers: &mut Headers) -> Result<(), Error> {
    if let Some(ver) = line.strip_prefix(VERSION_PREFIX) {
        headers.type_ver = Some(ver.trim().to_string());
    } else if let Some(name) = line.strip_prefix(RUN_NAME_PREFIX) {
        headers.run_name = Some(name.trim().to_string());
    } else if line.starts_with(GENOME_COUNT_PREFIX) {
        headers.genome_count = Some(header_value(line, GENOME_COUNT_PREFIX)?);
    } else if line.starts_with(CORE_LENGTH_PREFIX) {
        headers.core_length = Some(header_value(line, CORE_LENGTH_PREFIX)?);
    } else if let Some(rest) = line.strip_prefix(GENOME_SIZE_PREFIX) {
        // trailing ";traits_per_genome" annotation
        let size = rest.split(';').next().unwrap_or_default().trim();
        headers.mean_est_genome_size = Some(
            size.parse()
                .map_err(|_| Error::Parse(format!("invalid value in header line: {line}")))?,
        );
    } else if let Some(rest) = line.strip_prefix(GENOMES_PREFIX) {
        headers.genomes = Some(
            rest.split(';')
                .filter(|entry| !entry.trim().is_empty())
                .map(parse_genome_entry)
                .collect::<Result<_, _>>()?,
        );
    }
    Ok(())
}

/// Parses `<id>:prior_complete=<p>:posterior_complete=<q>`.
fn parse_genome_entry(entry: &str) -> Result<GenomeCompleteness, Error> {
    let invalid = || Error::Parse(format!("invalid genome completeness entry '{entry}'"));
    let mut parts = entry.trim().rsplitn(3, ':');
    let posterior = parts.next().ok_or_else(invalid)?;
    let prior = parts.next().ok_or_else(invalid)?;
    let genome_id = parts.next().filter(|g| !g.is_empty()).ok_or_else(invalid)?;

    let prior = prior.strip_prefix("prior_complete=").ok_or_else(invalid)?;
    let posterior_text = posterior
        .strip_prefix("posterior_complete=")
        .ok_or_else(invalid)?;
    Ok(GenomeCompleteness {
        genome_id: genome_id.to_string(),
        prior: prior.parse().map_err(|_| invalid())?,
        posterior: posterior_text.parse().map_err(|_| invalid())?,
        posterior_text: posterior_text.to_string(),
    })
}

fn parse_row(line: &str) -> Result<EstimatorRow, Error> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 {
        return Err(Error::Parse(format!(
            "estimator row has {} columns, expected 7: {line}",
            fields.len()
        )));
    }
    let invalid = |what: &str| Error::Parse(format!("invalid {what} in estimator row: {line}"));
    Ok(EstimatorRow {
        cluster_id: fields[0].to_string(),
        category: fields[1].parse()?,
        genome_occurrence_count: fields[2].parse().map_err(|_| invalid("genome occurrence"))?,
        core_log_likelihood: fields[3].parse().map_err(|_| invalid("log-likelihood"))?,
        raw_mean_copies: fields[4].parse().map_err(|_| invalid("mean copies"))?,
    })
}

/// Posterior completeness table: `<qual stem>-mOTUpan.qual` in the run directory.
pub fn completeness_output_path(run_dir: &Path, quality: &Path) -> PathBuf {
    let name = quality
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".checkm").unwrap_or(&name);
    run_dir.join(format!("{stem}-mOTUpan.qual"))
}

/// Writes posterior completeness in quality-table layout, sorted by genome,
/// with `-` for contamination.
pub fn write_completeness<W: Write>(writer: &mut W, genomes: &[GenomeCompleteness]) -> Result<(), Error> {
    let mut sorted: Vec<&GenomeCompleteness> = genomes.iter().collect();
    sorted.sort_by(|a, b| a.genome_id.cmp(&b.genome_id));
    writeln!(writer, "{}", QUALITY_HEADER.join("\t"))?;
    for g in sorted {
        writeln!(writer, "{}\t{}\t-", g.genome_id, g.posterior_text)?;
    }
    Ok(())
}

pub fn write_completeness_file(path: &Path, genomes: &[GenomeCompleteness]) -> Result<(), Error> {
    let mut buf = Vec::new();
    write_completeness(&mut buf, genomes)?;
    std::fs::write(path, buf)
        .map_err(|e| Error::Format(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) const ESTIMATOR: &str = "\
#mOTUlizer:mOTUpan:0.3.2
#run_name=g__Test
#genome_count=2
#core_length=1
#mean_est_genome_size=1820.5;traits_per_genome
#genomes=g1:prior_complete=90.1:posterior_complete=95.5;g2:prior_complete=80:posterior_complete=88.25
#some other comment
trait_name\ttype\tgenome_occurences\tlog_likelihood_to_be_core\tmean_copy_per_genome\tgenomes\tgenes

clusterX\tcore\t2\t-2.5\t1.0\tg1;g2\tNA
clusterY\taccessory\t1\t-10.25\t0.5\tg1\tNA
";

    #[test]
    fn parses_headers_and_rows() {
        let out = EstimatorOutput::parse(Cursor::new(ESTIMATOR)).unwrap();
        assert_eq!(out.type_ver, "0.3.2");
        assert_eq!(out.run_name, "g__Test");
        assert_eq!(out.genome_count, 2);
        assert_eq!(out.core_length, 1);
        assert_eq!(out.mean_est_genome_size, 1820.5);
        assert_eq!(out.genomes.len(), 2);
        assert_eq!(out.genomes[1].prior, 80.0);
        assert_eq!(out.genomes[1].posterior_text, "88.25");
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].category, ClusterCategory::Core);
        assert_eq!(out.rows[1].core_log_likelihood, -10.25);
        assert_eq!(out.genome_names(), vec!["g1", "g2"]);
    }

    #[test]
    fn missing_header_is_parse_error() {
        let text = ESTIMATOR.replace("#core_length=1\n", "");
        let err = EstimatorOutput::parse(Cursor::new(text)).unwrap_err();
        assert!(err.to_string().contains("core_length"));
    }

    #[test]
    fn short_row_quotes_line() {
        let text = format!("{ESTIMATOR}clusterZ\tcore\t1\n");
        let err = EstimatorOutput::parse(Cursor::new(text)).unwrap_err();
        assert!(err.to_string().contains("clusterZ\tcore\t1"));
    }

    #[test]
    fn genome_entry_with_colon_in_id() {
        let g = parse_genome_entry("bin:7:prior_complete=1.5:posterior_complete=2").unwrap();
        assert_eq!(g.genome_id, "bin:7");
        assert_eq!(g.posterior, 2.0);
        assert!(parse_genome_entry("g1:complete=1:posterior_complete=2").is_err());
    }

    #[test]
    fn completeness_table() {
        let out = EstimatorOutput::parse(Cursor::new(ESTIMATOR)).unwrap();
        let mut buf = Vec::new();
        write_completeness(&mut buf, &out.genomes).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Bin Id\tCompleteness\tContamination\ng1\t95.5\t-\ng2\t88.25\t-\n"
        );
        assert_eq!(
            completeness_output_path(Path::new("/run"), Path::new("/run/g__Test.checkm")),
            Path::new("/run/g__Test-mOTUpan.qual")
        );
    }

    #[test]
    fn command_lines() {
        let clusters = ClusterOutputs::new(Path::new("run"), "g__Test");
        let converted = converted_clusters_path(Path::new("run"), &clusters);
        assert_eq!(converted, Path::new("run/g__Test-clust-motupan_in.json"));
        let cmd = convert_command(Path::new("mOTUconvert.py"), &clusters.clusters, &converted);
        assert_eq!(
            cmd.to_string(),
            "mOTUconvert.py --in_type mmseqs2 -o run/g__Test-clust-motupan_in.json run/g__Test-clust_cluster.tsv"
        );
        let out = estimator_output_path(Path::new("run"), "g__Test");
        let cmd = estimate_command(Path::new("mOTUpan.py"), &converted, Path::new("q.checkm"), 1, &out);
        assert_eq!(
            cmd.to_string(),
            "mOTUpan.py --gene_clusters_file run/g__Test-clust-motupan_in.json --checkm q.checkm --max_iter 1 --output run/g__Test-pangenome.mOTUpan"
        );
    }
}
