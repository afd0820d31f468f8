//! Post-hoc annotation of pangenome clusters: functions and gene names from
//! per-genome function tables, and representative protein sequences from the
//! clustering output.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::annotation::{ClusterAnnotation, set_translation};
use crate::error::Error;
use crate::fasta::read_fasta;
use crate::format::split_generated_id;
use crate::genome::Alias;
use crate::pangenome::{GeneSource, PangenomeObject};
use crate::tsv::{IdMap, open_text};
use crate::upa::{GenomeIdentifier, Upa};

/// Taxonomic domain, selecting which function table files are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Bacteria,
    Archaea,
}

impl Domain {
    pub fn file_prefix(self) -> &'static str {
        match self {
            Domain::Bacteria => "GTDB_Bac",
            Domain::Archaea => "GTDB_Arc",
        }
    }
}

/// Anything starting with `A`/`a` is Archaea, everything else Bacteria.
impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().chars().next() {
            None => Err(Error::Parse("empty domain".to_string())),
            Some(c) if c.eq_ignore_ascii_case(&'a') => Ok(Domain::Archaea),
            Some(_) => Ok(Domain::Bacteria),
        }
    }
}

/// Per-clade file layout under a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CladePaths {
    dir: PathBuf,
    clade: String,
}

impl CladePaths {
    pub fn new(base_dir: &Path, clade: &str) -> Self {
        Self {
            dir: base_dir.join(clade),
            clade: clade.to_string(),
        }
    }

    pub fn clade(&self) -> &str {
        &self.clade
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", self.clade))
    }

    pub fn pangenome(&self) -> PathBuf {
        self.file("-mOTUpan-pangenome.json")
    }

    pub fn with_functions(&self) -> PathBuf {
        self.file("-mOTUpan-pangenome-fxn.json")
    }

    pub fn with_proteins(&self) -> PathBuf {
        self.file("-mOTUpan-pangenome-fxn-prot.json")
    }

    pub fn rep_seqs(&self) -> PathBuf {
        self.file("-clust_rep_seq.fasta")
    }

    pub fn gene_id_map(&self) -> PathBuf {
        self.file(".gene_id_map")
    }
}

/// Reads `count lineage` rows; the clade is the last `;`-separated lineage item.
pub fn read_clades<R: BufRead>(reader: R) -> Result<Vec<String>, Error> {
    let mut clades = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [_count, lineage] = fields.as_slice() else {
            return Err(Error::Parse(format!(
                "clades file line {} must be 'count lineage': {line}",
                line_num + 1
            )));
        };
        let clade = lineage.rsplit(';').next().unwrap_or_default();
        if clade.is_empty() {
            return Err(Error::Parse(format!(
                "clades file line {} has an empty clade: {line}",
                line_num + 1
            )));
        }
        clades.push(clade.to_string());
    }
    Ok(clades)
}

/// Reads one ID per line, skipping `#` comments and blank lines.
pub fn read_id_list<R: BufRead>(reader: R) -> Result<HashSet<String>, Error> {
    let mut ids = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if id.is_empty() || id.starts_with('#') {
            continue;
        }
        ids.insert(id.to_string());
    }
    Ok(ids)
}

/// Genome ID as used in function tables: the genome name without `_protein`.
pub fn target_genome_id(genome_name: &str) -> String {
    genome_name.replace("_protein", "")
}

/// Genome IDs named by a set of pangenomes.
pub fn target_genome_ids<'a, I>(pangenomes: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a PangenomeObject>,
{
    pangenomes
        .into_iter()
        .flat_map(|pg| pg.genome_names.iter().map(|n| target_genome_id(n)))
        .collect()
}

/// Genome ID ↔ object reference, restricted to a set of target genomes.
#[derive(Debug, Default)]
pub struct GenomeUpaMap {
    by_id: HashMap<String, Upa>,
    by_object: HashMap<Upa, String>,
}

impl GenomeUpaMap {
    /// Parses `genome_id \t upa` rows, keeping only `targets`. Rows for
    /// other genomes are skipped unchecked.
    pub fn parse<R: BufRead>(reader: R, targets: &HashSet<String>) -> Result<Self, Error> {
        let mut map = Self::default();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (genome_id, upa) = line.split_once('\t').unwrap_or((line, ""));
            if !targets.contains(genome_id) {
                continue;
            }
            if upa.is_empty() || upa.contains('\t') {
                return Err(Error::Parse(format!(
                    "genome reference map line {} must have 2 columns: {line}",
                    line_num + 1
                )));
            }
            let upa: Upa = upa.parse()?;
            if map.by_id.insert(genome_id.to_string(), upa).is_some() {
                return Err(Error::Validation(format!(
                    "duplicate key '{genome_id}' in genome reference map"
                )));
            }
            map.by_object.insert(upa.unversioned(), genome_id.to_string());
        }
        Ok(map)
    }

    pub fn from_file(path: &Path, targets: &HashSet<String>) -> Result<Self, Error> {
        Self::parse(open_text(path)?, targets)
    }

    /// The full reference of a genome.
    pub fn upa(&self, genome_id: &str) -> Result<Upa, Error> {
        self.by_id
            .get(genome_id)
            .copied()
            .ok_or_else(|| Error::lookup("genome reference map", genome_id))
    }

    /// The genome stored at `upa`, matched on workspace and object only.
    pub fn genome_id(&self, upa: Upa) -> Result<&str, Error> {
        self.by_object
            .get(&upa.unversioned())
            .map(String::as_str)
            .ok_or_else(|| Error::lookup("genome reference map", &upa.to_string()))
    }

    fn contains_object(&self, upa: Upa) -> bool {
        self.by_object.contains_key(&upa.unversioned())
    }

    /// Genome ID behind an ortholog's genome column.
    fn resolve(&self, genome: &GenomeIdentifier) -> Result<String, Error> {
        match genome {
            GenomeIdentifier::Reference(upa) => self.genome_id(*upa).map(str::to_string),
            GenomeIdentifier::Name(name) => Ok(target_genome_id(name)),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct GeneAnnotation {
    pub names: Vec<String>,
    pub functions: Vec<String>,
}

/// Gene annotation per genome ID and gene ID.
#[derive(Debug, Default)]
pub struct FunctionTable {
    genomes: HashMap<String, HashMap<String, GeneAnnotation>>,
}

/// Strips the `gene-` prefix and `.CDS` suffix used in function tables.
pub fn normalize_gene_id(gene_id: &str) -> &str {
    let id = gene_id.strip_prefix("gene-").unwrap_or(gene_id);
    id.strip_suffix(".CDS").unwrap_or(id)
}

fn labeled_json<'de, T: Deserialize<'de>>(field: &'de str, label: &str, line: &str) -> Result<T, Error> {
    let value = field.trim().strip_prefix(label).unwrap_or(field);
    serde_json::from_str(value)
        .map_err(|e| Error::Parse(format!("invalid {label} field ({e}): {line}")))
}

impl FunctionTable {
    /// Reads rows `upa \t gene_id \t "aliases":[...] \t "functions":[...] \t inference`
    /// for genomes in `upas`.
    pub fn read<R: BufRead>(&mut self, reader: R, upas: &GenomeUpaMap) -> Result<usize, Error> {
        let mut rows = 0;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            // A reference that does not parse cannot name a target genome.
            let upa = match fields[0].parse::<Upa>() {
                Ok(upa) if upas.contains_object(upa) => upa,
                _ => continue,
            };
            if fields.len() != 5 {
                return Err(Error::Parse(format!(
                    "function table row has {} columns, expected 5: {line}",
                    fields.len()
                )));
            }
            let genome_id = upas.genome_id(upa)?.to_string();
            let aliases: Vec<Alias> = labeled_json(fields[2], "\"aliases\":", line)?;
            let functions: Vec<String> = labeled_json(fields[3], "\"functions\":", line)?;
            let names = aliases
                .into_iter()
                .filter_map(|a| match a {
                    Alias::Typed(kind, value) if kind == "gene" => Some(value),
                    _ => None,
                })
                .collect();
            self.genomes
                .entry(genome_id)
                .or_default()
                .insert(
                    normalize_gene_id(fields[1]).to_string(),
                    GeneAnnotation { names, functions },
                );
            rows += 1;
        }
        Ok(rows)
    }

    /// Reads every function table file for `domain` found under `dir`,
    /// recursively. Returns the table and the files read.
    pub fn load_dir(dir: &Path, domain: Domain, upas: &GenomeUpaMap) -> Result<(Self, Vec<PathBuf>), Error> {
        let mut files = Vec::new();
        collect_files(dir, domain.file_prefix(), &mut files)?;
        files.sort();
        let mut table = Self::default();
        for file in &files {
            table
                .read(open_text(file)?, upas)
                .map_err(|e| Error::Parse(format!("{}: {e}", file.display())))?;
        }
        Ok((table, files))
    }

    pub fn get(&self, genome_id: &str, gene_id: &str) -> Option<&GeneAnnotation> {
        self.genomes.get(genome_id)?.get(gene_id)
    }

    pub fn genome_count(&self) -> usize {
        self.genomes.len()
    }
}

fn collect_files(dir: &Path, prefix: &str, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Format(format!("failed to read directory {}: {e}", dir.display())))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, prefix, out)?;
        } else if path.is_file()
            && path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(prefix))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Sets `function`, `function_sources` and `gene_name` on every cluster from
/// the function table. Only genes in `preferred` genomes contribute.
pub fn merge_functions(
    pangenome: &mut PangenomeObject,
    table: &FunctionTable,
    preferred: &HashSet<String>,
    upas: &GenomeUpaMap,
) -> Result<(), Error> {
    for cluster in &mut pangenome.orthologs {
        let mut annotation = ClusterAnnotation::new();
        for ortholog in &cluster.orthologs {
            annotation.add_member(GeneSource {
                gene_id: ortholog.gene_id.clone(),
                genome: ortholog.genome.clone(),
            });
            let genome_id = upas.resolve(&ortholog.genome)?;
            if !preferred.contains(&genome_id) {
                continue;
            }
            annotation.mark_source_genome();
            if let Some(gene) = table.get(&genome_id, &ortholog.gene_id) {
                annotation.add_functions(gene.functions.iter().map(String::as_str));
                annotation.add_gene_names(gene.names.iter().map(String::as_str));
            }
        }
        annotation.apply_functions(cluster);
    }
    Ok(())
}

/// Representative sequences by cluster ID, trailing `*` removed.
pub fn read_rep_seqs(path: &Path) -> Result<HashMap<String, String>, Error> {
    Ok(read_fasta(path)?
        .into_iter()
        .map(|r| (r.id, r.sequence.trim_end_matches('*').to_string()))
        .collect())
}

/// Sets each cluster's protein translation to its clustering representative.
/// The cluster ID is the representative's generated gene ID, so the source
/// gene and genome come from the gene ID map and the genome reference map.
pub fn attach_representatives(
    pangenome: &mut PangenomeObject,
    rep_seqs: &HashMap<String, String>,
    gene_id_map: &IdMap,
    upas: &GenomeUpaMap,
) -> Result<(), Error> {
    for cluster in &mut pangenome.orthologs {
        let sequence = rep_seqs
            .get(&cluster.id)
            .ok_or_else(|| Error::lookup("representative sequences", &cluster.id))?;
        let (genome_id, _) = split_generated_id(&cluster.id)?;
        let source = GeneSource {
            gene_id: gene_id_map.resolve(&cluster.id)?.to_string(),
            genome: GenomeIdentifier::Reference(upas.upa(genome_id)?),
        };
        set_translation(cluster, sequence, source);
    }
    Ok(())
}
