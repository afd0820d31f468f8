use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::mmseqs::{ClusterMode, ClusterParams};

const DEFAULT_MMSEQS: &str = "mmseqs";
const DEFAULT_MOTUCONVERT: &str = "mOTUconvert.py";
const DEFAULT_MOTUPAN: &str = "mOTUpan.py";

/// Locations of the external tools. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPaths {
    #[serde(default = "default_mmseqs")]
    pub mmseqs: PathBuf,
    #[serde(default = "default_motuconvert")]
    pub motuconvert: PathBuf,
    #[serde(default = "default_motupan")]
    pub motupan: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mmseqs: default_mmseqs(),
            motuconvert: default_motuconvert(),
            motupan: default_motupan(),
        }
    }
}

fn default_mmseqs() -> PathBuf {
    PathBuf::from(DEFAULT_MMSEQS)
}

fn default_motuconvert() -> PathBuf {
    PathBuf::from(DEFAULT_MOTUCONVERT)
}

fn default_motupan() -> PathBuf {
    PathBuf::from(DEFAULT_MOTUPAN)
}

/// Clustering and estimator settings shared by file-based and host runs.
/// Host parameter files use the snake_case names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    #[serde(default, alias = "mmseqs_cluster_mode")]
    pub mmseqs_cluster_mode: ClusterMode,
    #[serde(default, alias = "mmseqs_min_seq_id")]
    pub mmseqs_min_seq_id: f64,
    #[serde(default = "default_min_coverage", alias = "mmseqs_min_coverage")]
    pub mmseqs_min_coverage: f64,
    #[serde(default, alias = "mmseqs_cov_mode")]
    pub mmseqs_cov_mode: u8,
    #[serde(default = "default_max_iter", alias = "motupan_max_iter")]
    pub motupan_max_iter: u32,
    #[serde(default, alias = "force_redo")]
    pub force_redo: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mmseqs_cluster_mode: ClusterMode::default(),
            mmseqs_min_seq_id: 0.0,
            mmseqs_min_coverage: default_min_coverage(),
            mmseqs_cov_mode: 0,
            motupan_max_iter: default_max_iter(),
            force_redo: false,
        }
    }
}

fn default_min_coverage() -> f64 {
    0.8
}

fn default_max_iter() -> u32 {
    1
}

impl PipelineSettings {
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            mode: self.mmseqs_cluster_mode,
            min_seq_id: self.mmseqs_min_seq_id,
            cov_mode: self.mmseqs_cov_mode,
            min_coverage: self.mmseqs_min_coverage,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fraction("mmseqsMinSeqId", self.mmseqs_min_seq_id)?;
        validate_fraction("mmseqsMinCoverage", self.mmseqs_min_coverage)?;
        if self.mmseqs_cov_mode > 5 {
            bail!("invalid mmseqsCovMode {}: expected 0-5", self.mmseqs_cov_mode);
        }
        if self.motupan_max_iter == 0 {
            bail!("motupanMaxIter must be at least 1");
        }
        Ok(())
    }
}

fn validate_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("invalid {name} {value}: expected a value between 0 and 1");
    }
    Ok(())
}

/// A file-based pipeline run over previously formatted inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub input_faa_path: PathBuf,
    pub input_qual_path: PathBuf,
    pub input_gene_id_map_path: PathBuf,
    pub run_dir: PathBuf,
    pub output_pangenome_json_path: PathBuf,
    /// Genome name → object reference map; switches orthologs to reference mode.
    #[serde(default)]
    pub genome_name2ref_path: Option<PathBuf>,
    /// Genome record JSON files used to annotate clusters.
    #[serde(default)]
    pub genome_records: Vec<PathBuf>,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(flatten)]
    pub settings: PipelineSettings,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        for (name, path) in self.input_files() {
            if !crate::tsv::is_nonempty_file(path) {
                bail!("{name} is missing or empty: {}", path.display());
            }
        }

        if !self.run_dir.is_dir() {
            bail!("run directory does not exist: {}", self.run_dir.display());
        }

        Ok(())
    }

    /// All input files as (name, path) pairs.
    pub fn input_files(&self) -> impl Iterator<Item = (&str, &Path)> {
        [
            ("inputFaaPath", self.input_faa_path.as_path()),
            ("inputQualPath", self.input_qual_path.as_path()),
            ("inputGeneIdMapPath", self.input_gene_id_map_path.as_path()),
        ]
        .into_iter()
        .chain(
            self.genome_name2ref_path
                .as_deref()
                .map(|p| ("genomeName2RefPath", p)),
        )
        .chain(self.genome_records.iter().map(|p| ("genomeRecords", p.as_path())))
    }
}

/// Completeness/contamination used when a genome carries no quality score.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityFallback {
    pub completeness: f64,
    pub contamination: f64,
}

/// Where the host services live and where runs are staged.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Object store (workspace service) endpoint.
    pub workspace_url: String,
    /// Endpoint dispatching to the file, report and plotting services.
    pub callback_url: String,
    /// Scratch directory in which per-run directories are created.
    pub scratch: PathBuf,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub quality_fallback: Option<QualityFallback>,
    /// Upper bound on genomes for which a circle plot is requested.
    #[serde(default = "default_circle_plot_max_genomes")]
    pub circle_plot_max_genomes: usize,
}

fn default_circle_plot_max_genomes() -> usize {
    20
}

impl HostConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [("workspaceUrl", &self.workspace_url), ("callbackUrl", &self.callback_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("invalid {name}: '{url}'");
            }
        }
        if !self.scratch.is_dir() {
            bail!("scratch directory does not exist: {}", self.scratch.display());
        }
        if let Some(fallback) = &self.quality_fallback {
            for (name, value) in [
                ("completeness", fallback.completeness),
                ("contamination", fallback.contamination),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    bail!("invalid qualityFallback {name} {value}: expected a percentage");
                }
            }
        }
        Ok(())
    }
}

/// Which estimate of genome quality to read from genome objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum CheckmVersion {
    #[default]
    #[serde(rename = "CheckM-1")]
    CheckM1,
    #[serde(rename = "CheckM-2")]
    CheckM2,
}

impl CheckmVersion {
    /// The `method` name of matching quality scores.
    pub fn method(self) -> &'static str {
        match self {
            CheckmVersion::CheckM1 => "CheckM",
            CheckmVersion::CheckM2 => "CheckM2",
        }
    }
}

/// Parameters of one host-orchestrated run.
#[derive(Debug, Clone, Deserialize)]
pub struct HostParams {
    pub workspace_name: String,
    pub input_ref: String,
    pub output_pangenome_name: String,
    #[serde(default)]
    pub checkm_version: CheckmVersion,
    #[serde(flatten)]
    pub settings: PipelineSettings,
    /// Base genome for the circle plot; the centroid genome when absent.
    #[serde(default)]
    pub pcp_input_genome_ref: Option<String>,
    #[serde(default)]
    pub pcp_input_compare_genome_refs: Vec<String>,
    #[serde(default)]
    pub pcp_input_outgroup_genome_refs: Vec<String>,
    #[serde(default)]
    pub pcp_save_featuresets: bool,
    #[serde(default)]
    pub pcp_genome_disp_name_config: Option<String>,
}

impl HostParams {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read params file: {}", path.display()))?;
        let params: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse params file: {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("workspace_name", &self.workspace_name),
            ("input_ref", &self.input_ref),
            ("output_pangenome_name", &self.output_pangenome_name),
        ] {
            if value.trim().is_empty() {
                bail!("required parameter '{name}' is missing");
            }
        }
        self.settings.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    fn run_config_json(dir: &Path, extra: &str) -> String {
        for name in ["in.faa", "in.checkm", "in.gene_id_map"] {
            std::fs::write(dir.join(name), "x\n").unwrap();
        }
        format!(
            r#"{{
                "inputFaaPath": "{d}/in.faa",
                "inputQualPath": "{d}/in.checkm",
                "inputGeneIdMapPath": "{d}/in.gene_id_map",
                "runDir": "{d}",
                "outputPangenomeJsonPath": "{d}/out.json"{extra}
            }}"#,
            d = dir.display()
        )
    }

    #[test]
    fn run_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_config(&run_config_json(dir.path(), ""));
        let config = RunConfig::from_file(f.path()).unwrap();
        assert_eq!(config.settings.mmseqs_cluster_mode, ClusterMode::EasyCluster);
        assert_eq!(config.settings.mmseqs_min_seq_id, 0.0);
        assert_eq!(config.settings.mmseqs_min_coverage, 0.8);
        assert_eq!(config.settings.motupan_max_iter, 1);
        assert!(!config.settings.force_redo);
        assert_eq!(config.tools.mmseqs, PathBuf::from("mmseqs"));
        assert_eq!(config.input_files().count(), 3);
    }

    #[test]
    fn run_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let extra = r#",
            "mmseqsClusterMode": "easy-linclust",
            "mmseqsMinCoverage": 0.5,
            "motupanMaxIter": 3,
            "forceRedo": true,
            "tools": { "mmseqs": "/opt/bin/mmseqs" }"#;
        let f = write_config(&run_config_json(dir.path(), extra));
        let config = RunConfig::from_file(f.path()).unwrap();
        assert_eq!(config.settings.mmseqs_cluster_mode, ClusterMode::EasyLinclust);
        assert_eq!(config.settings.cluster_params().min_coverage, 0.5);
        assert_eq!(config.settings.motupan_max_iter, 3);
        assert!(config.settings.force_redo);
        assert_eq!(config.tools.mmseqs, PathBuf::from("/opt/bin/mmseqs"));
        assert_eq!(config.tools.motupan, PathBuf::from("mOTUpan.py"));
    }

    #[test]
    fn run_config_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let json = run_config_json(dir.path(), "");
        std::fs::remove_file(dir.path().join("in.checkm")).unwrap();
        let f = write_config(&json);
        let err = RunConfig::from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("inputQualPath"));
    }

    #[test]
    fn run_config_bad_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_config(&run_config_json(dir.path(), r#", "mmseqsMinCoverage": 1.5"#));
        let err = RunConfig::from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("mmseqsMinCoverage"));
    }

    #[test]
    fn host_params_defaults_and_required() {
        let f = write_config(
            r#"{"workspace_name": "ws", "input_ref": "1/2/3", "output_pangenome_name": "pg"}"#,
        );
        let params = HostParams::from_file(f.path()).unwrap();
        assert_eq!(params.checkm_version, CheckmVersion::CheckM1);
        assert_eq!(params.checkm_version.method(), "CheckM");
        assert_eq!(params.settings.mmseqs_min_coverage, 0.8);
        assert!(params.pcp_input_genome_ref.is_none());

        let f = write_config(
            r#"{"workspace_name": "ws", "input_ref": "1/2/3", "output_pangenome_name": "pg",
                "checkm_version": "CheckM-2", "mmseqs_cluster_mode": "easy-linclust", "motupan_max_iter": 2}"#,
        );
        let params = HostParams::from_file(f.path()).unwrap();
        assert_eq!(params.checkm_version.method(), "CheckM2");
        assert_eq!(params.settings.mmseqs_cluster_mode, ClusterMode::EasyLinclust);
        assert_eq!(params.settings.motupan_max_iter, 2);

        let f = write_config(r#"{"workspace_name": "ws", "input_ref": "", "output_pangenome_name": "pg"}"#);
        let err = HostParams::from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("input_ref"));
    }

    #[test]
    fn host_config_validation() {
        let dir = tempfile::tempdir().unwrap();
        let json = format!(
            r#"{{"workspaceUrl": "https://kbase.us/services/ws", "callbackUrl": "http://localhost:9999", "scratch": "{}",
                 "qualityFallback": {{"completeness": 90.0, "contamination": 2.0}}}}"#,
            dir.path().display()
        );
        let config = HostConfig::from_file(write_config(&json).path()).unwrap();
        assert_eq!(config.circle_plot_max_genomes, 20);
        assert_eq!(
            config.quality_fallback,
            Some(QualityFallback { completeness: 90.0, contamination: 2.0 })
        );

        let json = format!(
            r#"{{"workspaceUrl": "https://kbase.us/services/ws", "callbackUrl": "localhost", "scratch": "{}"}}"#,
            dir.path().display()
        );
        let err = HostConfig::from_file(write_config(&json).path()).unwrap_err();
        assert!(err.to_string().contains("callbackUrl"));
    }
}
