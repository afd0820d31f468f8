//! Clustering with mmseqs2 and parsing of its cluster membership table.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::runner::{StageStatus, ToolCommand, run_memoized};
use crate::tsv::open_text;

/// Scratch directory mmseqs2 writes into, relative to the run directory.
pub const WORK_DIR: &str = "mmseqs_work";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterMode {
    #[default]
    #[serde(rename = "easy-cluster")]
    EasyCluster,
    #[serde(rename = "easy-linclust")]
    EasyLinclust,
}

impl ClusterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterMode::EasyCluster => "easy-cluster",
            ClusterMode::EasyLinclust => "easy-linclust",
        }
    }
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy-cluster" => Ok(ClusterMode::EasyCluster),
            "easy-linclust" => Ok(ClusterMode::EasyLinclust),
            _ => Err(Error::Validation(format!(
                "unknown mmseqs cluster mode '{s}', expected 'easy-cluster' or 'easy-linclust'"
            ))),
        }
    }
}

/// Parameters of one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub mode: ClusterMode,
    pub min_seq_id: f64,
    pub cov_mode: u8,
    pub min_coverage: f64,
}

/// Files produced by a clustering run with output prefix `<stem>-clust`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOutputs {
    pub prefix: String,
    pub clusters: PathBuf,
    pub rep_seqs: PathBuf,
}

impl ClusterOutputs {
    pub fn new(run_dir: &Path, stem: &str) -> Self {
        let prefix = format!("{stem}-clust");
        Self {
            clusters: run_dir.join(format!("{prefix}_cluster.tsv")),
            rep_seqs: run_dir.join(format!("{prefix}_rep_seq.fasta")),
            prefix,
        }
    }
}

pub fn cluster_command(
    mmseqs: &Path,
    params: &ClusterParams,
    input_faa: &Path,
    outputs: &ClusterOutputs,
) -> ToolCommand {
    ToolCommand::new(mmseqs)
        .arg(params.mode.as_str())
        .arg(input_faa.display().to_string())
        .arg(outputs.prefix.as_str())
        .arg(WORK_DIR)
        .args(["--min-seq-id".to_string(), params.min_seq_id.to_string()])
        .args(["--cov-mode".to_string(), params.cov_mode.to_string()])
        .args(["-c".to_string(), params.min_coverage.to_string()])
}

/// Clusters `input_faa`, skipping the run when the membership table already
/// exists. The scratch directory is removed after a run.
pub fn run_clustering(
    mmseqs: &Path,
    params: &ClusterParams,
    input_faa: &Path,
    run_dir: &Path,
    stem: &str,
    force_redo: bool,
    sink: &mut dyn FnMut(&str),
) -> Result<(ClusterOutputs, StageStatus), Error> {
    let outputs = ClusterOutputs::new(run_dir, stem);
    let cmd = cluster_command(mmseqs, params, input_faa, &outputs);
    let status = run_memoized(&cmd, run_dir, &outputs.clusters, force_redo, sink)?;
    let work = run_dir.join(WORK_DIR);
    if work.exists() {
        fs::remove_dir_all(&work)?;
    }
    Ok((outputs, status))
}

/// Cluster ID → member gene IDs, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct ClusterMembership {
    order: Vec<String>,
    members: HashMap<String, Vec<String>>,
}

impl ClusterMembership {
    /// Parses `cluster_id \t member_gene_id` rows. Blank lines are skipped.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut membership = Self::default();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                return Err(Error::Parse(format!(
                    "cluster table line {} has {} columns, expected 2: {line}",
                    line_num + 1,
                    fields.len()
                )));
            }
            membership.push(fields[0], fields[1]);
        }
        Ok(membership)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        Self::parse(open_text(path)?)
    }

    pub fn push(&mut self, cluster_id: &str, gene_id: &str) {
        match self.members.get_mut(cluster_id) {
            Some(genes) => genes.push(gene_id.to_string()),
            None => {
                self.order.push(cluster_id.to_string());
                self.members
                    .insert(cluster_id.to_string(), vec![gene_id.to_string()]);
            }
        }
    }

    pub fn members(&self, cluster_id: &str) -> Result<&[String], Error> {
        self.members
            .get(cluster_id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::lookup("cluster table", cluster_id))
    }

    /// Clusters in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.order
            .iter()
            .map(|id| (id.as_str(), self.members[id].as_slice()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn membership_keeps_first_appearance_order() {
        let table = "g2_5\tg2_5\ng1_1\tg1_1\ng2_5\tg1_3\n\ng1_1\tg3_2\n";
        let m = ClusterMembership::parse(Cursor::new(table)).unwrap();
        assert_eq!(m.len(), 2);
        let clusters: Vec<_> = m.iter().map(|(id, genes)| (id, genes.len())).collect();
        assert_eq!(clusters, vec![("g2_5", 2), ("g1_1", 2)]);
        assert_eq!(m.members("g1_1").unwrap(), ["g1_1", "g3_2"]);
        assert!(matches!(m.members("g9_9"), Err(Error::Lookup { .. })));
    }

    #[test]
    fn membership_rejects_wrong_columns() {
        let err = ClusterMembership::parse(Cursor::new("a\tb\tc\n")).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn command_line() {
        let params = ClusterParams {
            mode: ClusterMode::EasyLinclust,
            min_seq_id: 0.0,
            cov_mode: 0,
            min_coverage: 0.8,
        };
        let outputs = ClusterOutputs::new(Path::new("/run"), "g__Test");
        assert_eq!(outputs.clusters, Path::new("/run/g__Test-clust_cluster.tsv"));
        assert_eq!(outputs.rep_seqs, Path::new("/run/g__Test-clust_rep_seq.fasta"));
        let cmd = cluster_command(Path::new("mmseqs"), &params, Path::new("g__Test.faa"), &outputs);
        assert_eq!(
            cmd.to_string(),
            "mmseqs easy-linclust g__Test.faa g__Test-clust mmseqs_work --min-seq-id 0 --cov-mode 0 -c 0.8"
        );
    }

    #[test]
    fn mode_names() {
        assert_eq!("easy-cluster".parse::<ClusterMode>().unwrap(), ClusterMode::EasyCluster);
        assert!("cluster".parse::<ClusterMode>().is_err());
        assert_eq!(ClusterMode::default().to_string(), "easy-cluster");
    }
}
