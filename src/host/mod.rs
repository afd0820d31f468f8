//! Host-orchestrated runs: genomes come from an object store, the pangenome
//! is saved back to it and a report is built by the host's services.

pub mod rpc;
pub mod workflow;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::upa::Upa;

/// Object type under which pangenomes are saved.
pub const PANGENOME_OBJECT_TYPE: &str = "KBaseGenomes.Pangenome";

/// Object-store metadata tuple:
/// `[objid, name, type, save_date, version, saved_by, wsid, workspace, chsum, size, meta]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ObjectInfoTuple")]
pub struct ObjectInfo {
    pub object_id: u64,
    pub name: String,
    pub type_string: String,
    pub version: u64,
    pub workspace_id: u64,
    pub workspace: String,
}

type ObjectInfoTuple = (
    u64,
    String,
    String,
    String,
    u64,
    String,
    u64,
    String,
    String,
    u64,
    Option<BTreeMap<String, String>>,
);

impl From<ObjectInfoTuple> for ObjectInfo {
    fn from(t: ObjectInfoTuple) -> Self {
        Self {
            object_id: t.0,
            name: t.1,
            type_string: t.2,
            version: t.4,
            workspace_id: t.6,
            workspace: t.7,
        }
    }
}

impl ObjectInfo {
    pub fn upa(&self) -> Upa {
        Upa::new(self.workspace_id, self.object_id, self.version)
    }

    /// Type name without its version, e.g. `KBaseSets.GenomeSet`.
    pub fn type_name(&self) -> &str {
        self.type_string
            .split_once('-')
            .map_or(self.type_string.as_str(), |(name, _)| name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoredObject {
    pub info: ObjectInfo,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub service: String,
    pub method: String,
    pub input_ws_objects: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveRequest {
    pub workspace: String,
    pub object_type: String,
    pub name: String,
    pub data: serde_json::Value,
    pub provenance: Vec<Provenance>,
}

/// A link to a stored file, as listed in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLink {
    pub shock_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A link as stored in a finished report, addressed by URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportLink {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl ReportLink {
    /// Re-addresses the link by store ID, the last path segment of its URL.
    pub fn to_file_link(&self) -> FileLink {
        FileLink {
            shock_id: self.url.rsplit('/').next().unwrap_or_default().to_string(),
            name: self.name.clone(),
            label: self.label.clone(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedObject {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

/// The parts of a stored report that are carried into another report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportContent {
    #[serde(default)]
    pub objects_created: Vec<CreatedObject>,
    #[serde(default)]
    pub file_links: Vec<ReportLink>,
    #[serde(default)]
    pub html_links: Vec<ReportLink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub workspace_name: String,
    pub report_object_name: String,
    pub message: String,
    pub objects_created: Vec<CreatedObject>,
    pub file_links: Vec<FileLink>,
    pub html_links: Vec<FileLink>,
    pub direct_html_link_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportInfo {
    pub name: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CirclePlotRequest {
    pub workspace_name: String,
    pub input_genome_ref: String,
    pub input_pangenome_ref: String,
    pub save_featuresets: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genome_disp_name_config: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_compare_genome_refs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_outgroup_genome_refs: Vec<String>,
}

pub trait ObjectStore {
    fn get_object(&self, reference: &str) -> Result<StoredObject>;
    fn save_object(&self, request: &SaveRequest) -> Result<ObjectInfo>;
}

pub trait FileStore {
    /// Uploads a directory as a zip archive and returns its store ID.
    fn upload_archive(&self, dir: &Path) -> Result<String>;
}

pub trait ReportService {
    fn create_report(&self, request: &ReportRequest) -> Result<ReportInfo>;
}

pub trait CirclePlotService {
    /// Builds a pangenome circle plot and returns the reference of its report.
    fn circle_plot(&self, request: &CirclePlotRequest) -> Result<String>;
}

/// The host services a run talks to.
pub struct HostServices<'a> {
    pub objects: &'a dyn ObjectStore,
    pub files: &'a dyn FileStore,
    pub reports: &'a dyn ReportService,
    pub plots: &'a dyn CirclePlotService,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_info_from_tuple() {
        let info: ObjectInfo = serde_json::from_str(
            r#"[7, "GCF_000008665.1", "KBaseGenomes.Genome-17.0", "2024-01-01T00:00:00+0000",
                3, "user", 42, "user:narrative_1", "abc", 1024, {}]"#,
        )
        .unwrap();
        assert_eq!(info.upa(), Upa::new(42, 7, 3));
        assert_eq!(info.type_name(), "KBaseGenomes.Genome");
        assert_eq!(info.name, "GCF_000008665.1");
    }

    #[test]
    fn report_link_uses_last_url_segment() {
        let link: ReportLink = serde_json::from_str(
            r#"{"URL": "https://kbase.us/services/shock-api/node/a1b2-c3", "name": "plot.html", "label": "Circle plot"}"#,
        )
        .unwrap();
        let file_link = link.to_file_link();
        assert_eq!(file_link.shock_id, "a1b2-c3");
        assert_eq!(file_link.label.as_deref(), Some("Circle plot"));
    }
}
