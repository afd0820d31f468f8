//! Input formatting: concatenates per-genome protein FASTA files under
//! generated gene IDs and writes the matching ID map and quality table.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::fasta::{FastaRecord, read_fasta};
use crate::genome::{GenomeRecord, host_gene_id};
use crate::tsv::{is_nonempty_file, open_text};

/// Header row of the quality tables consumed by the estimator.
pub const QUALITY_HEADER: [&str; 3] = ["Bin Id", "Completeness", "Contamination"];

/// Links a generated gene ID back to the ID it had in its source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneRecord {
    pub generated_id: String,
    pub original_id: String,
    pub genome_id: String,
}

/// Generated gene ID for the `ordinal`-th (1-based) gene of a genome.
pub fn generated_gene_id(genome_id: &str, ordinal: usize) -> String {
    format!("{genome_id}_{ordinal}")
}

/// Splits a generated gene ID into its genome ID and gene ordinal.
pub fn split_generated_id(generated_id: &str) -> Result<(&str, u32), Error> {
    let (genome, ordinal) = generated_id.rsplit_once('_').ok_or_else(|| {
        Error::Parse(format!("gene ID '{generated_id}' has no trailing _<number>"))
    })?;
    let ordinal: u32 = ordinal.parse().map_err(|_| {
        Error::Parse(format!("gene ID '{generated_id}' has no trailing _<number>"))
    })?;
    if genome.is_empty() {
        return Err(Error::Parse(format!("gene ID '{generated_id}' has no genome part")));
    }
    Ok((genome, ordinal))
}

/// Derives a genome ID from a protein FASTA path, e.g.
/// `faa/GCF_000008665.1_protein.faa.gz` → `GCF_000008665.1`.
pub fn genome_id_from_path(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [".gz", ".GZ", ".faa", ".fasta", "_protein"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }
    name
}

/// Reads a list of protein FASTA paths, one per line, keyed by derived genome ID.
pub fn read_faa_list<R: BufRead>(reader: R) -> Result<BTreeMap<String, PathBuf>, Error> {
    let mut files = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        let path = PathBuf::from(path);
        let genome_id = genome_id_from_path(&path);
        if genome_id.is_empty() {
            return Err(Error::Validation(format!(
                "cannot derive genome ID from {}",
                path.display()
            )));
        }
        if let Some(previous) = files.insert(genome_id.clone(), path) {
            return Err(Error::Validation(format!(
                "genome ID '{genome_id}' derived from more than one file (e.g. {})",
                previous.display()
            )));
        }
    }
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityRow {
    pub completeness: String,
    pub contamination: String,
}

/// Completeness/contamination per genome. Values are passed through verbatim.
#[derive(Debug, Clone, Default)]
pub struct QualityTable {
    rows: BTreeMap<String, QualityRow>,
}

impl QualityTable {
    /// Parses a 3-column quality table. A first line starting with `Bin Id`
    /// or `accession` is treated as a header.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut table = Self::default();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if line_num == 0 && (line.starts_with("Bin Id") || line.starts_with("accession")) {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                return Err(Error::Parse(format!(
                    "quality table line {} has {} columns, expected 3: {line}",
                    line_num + 1,
                    fields.len()
                )));
            }
            table.insert(fields[0], fields[1], fields[2]);
        }
        Ok(table)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        Self::parse(open_text(path)?)
    }

    pub fn insert(&mut self, genome_id: &str, completeness: &str, contamination: &str) {
        self.rows.insert(
            genome_id.to_string(),
            QualityRow {
                completeness: completeness.to_string(),
                contamination: contamination.to_string(),
            },
        );
    }

    pub fn get(&self, genome_id: &str) -> Result<&QualityRow, Error> {
        self.rows
            .get(genome_id)
            .ok_or_else(|| Error::lookup("quality table", genome_id))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the rows for `genome_ids`, in sorted order, under the standard header.
    pub fn write_subset<W: Write>(&self, writer: &mut W, genome_ids: &[&str]) -> Result<(), Error> {
        let mut ids = genome_ids.to_vec();
        ids.sort_unstable();
        writeln!(writer, "{}", QUALITY_HEADER.join("\t"))?;
        for id in ids {
            let row = self.get(id)?;
            writeln!(writer, "{id}\t{}\t{}", row.completeness, row.contamination)?;
        }
        Ok(())
    }
}

/// Output paths of the formatting stage.
#[derive(Debug, Clone)]
pub struct FormatOutputs {
    pub faa: PathBuf,
    pub quality: PathBuf,
    pub id_map: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSummary {
    pub genomes: usize,
    pub genes: usize,
}

/// A file written under a temporary name and moved into place on commit.
/// Dropping it uncommitted removes the temporary file.
struct StagedFile {
    tmp: PathBuf,
    dest: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl StagedFile {
    fn create(dest: &Path) -> Result<Self, Error> {
        let mut tmp = dest.as_os_str().to_owned();
        tmp.push(".partial");
        let tmp = PathBuf::from(tmp);
        let file = File::create(&tmp)
            .map_err(|e| Error::Format(format!("failed to create {}: {e}", tmp.display())))?;
        Ok(Self {
            tmp,
            dest: dest.to_path_buf(),
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    fn writer(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    fn commit(mut self) -> Result<(), Error> {
        self.writer.flush()?;
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Streams renamed FASTA records and ID map rows for one genome at a time.
struct FormattedWriter {
    faa: StagedFile,
    id_map: StagedFile,
    genes: usize,
}

impl FormattedWriter {
    fn create(outputs: &FormatOutputs) -> Result<Self, Error> {
        Ok(Self {
            faa: StagedFile::create(&outputs.faa)?,
            id_map: StagedFile::create(&outputs.id_map)?,
            genes: 0,
        })
    }

    fn add_genome<'a, I>(&mut self, genome_id: &str, records: I) -> Result<Vec<GeneRecord>, Error>
    where
        I: IntoIterator<Item = (String, &'a FastaRecord)>,
    {
        let mut genes = Vec::new();
        for (ordinal, (original_id, record)) in records.into_iter().enumerate() {
            let generated_id = generated_gene_id(genome_id, ordinal + 1);
            record.write_as(self.faa.writer(), &generated_id)?;
            writeln!(self.id_map.writer(), "{generated_id}\t{original_id}")?;
            genes.push(GeneRecord {
                generated_id,
                original_id,
                genome_id: genome_id.to_string(),
            });
        }
        self.genes += genes.len();
        Ok(genes)
    }

    fn finish(self) -> Result<usize, Error> {
        self.faa.commit()?;
        self.id_map.commit()?;
        Ok(self.genes)
    }
}

fn write_quality(
    path: &Path,
    quality: &QualityTable,
    genome_ids: &[&str],
) -> Result<StagedFile, Error> {
    let mut staged = StagedFile::create(path)?;
    quality.write_subset(staged.writer(), genome_ids)?;
    Ok(staged)
}

/// Formats per-genome protein FASTA files for clustering.
///
/// Every input file must exist and be non-empty, and every genome must have
/// a quality row; both are checked before any output is created. Outputs are
/// only moved into place once everything was written.
pub fn format_inputs(
    faa_files: &BTreeMap<String, PathBuf>,
    quality: &QualityTable,
    outputs: &FormatOutputs,
) -> Result<FormatSummary, Error> {
    for (genome_id, path) in faa_files {
        if !is_nonempty_file(path) {
            return Err(Error::Validation(format!(
                "protein FASTA for {genome_id} is missing or empty: {}",
                path.display()
            )));
        }
        quality.get(genome_id)?;
    }
    let genome_ids: Vec<&str> = faa_files.keys().map(String::as_str).collect();

    let quality_file = write_quality(&outputs.quality, quality, &genome_ids)?;
    let mut writer = FormattedWriter::create(outputs)?;
    for (genome_id, path) in faa_files {
        let records = read_fasta(path)?;
        writer.add_genome(genome_id, records.iter().map(|r| (r.id.clone(), r)))?;
    }
    let genes = writer.finish()?;
    quality_file.commit()?;

    Ok(FormatSummary {
        genomes: faa_files.len(),
        genes,
    })
}

/// Formats genome records fetched from the host. Each feature with a protein
/// translation becomes one sequence whose original ID is `<genome>.f:<feature>`.
pub fn format_genome_records(
    records: &[GenomeRecord],
    quality: &QualityTable,
    outputs: &FormatOutputs,
) -> Result<FormatSummary, Error> {
    let mut sorted: Vec<&GenomeRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    for pair in sorted.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(Error::Validation(format!(
                "genome name '{}' appears more than once",
                pair[0].name
            )));
        }
    }
    for record in &sorted {
        quality.get(&record.name)?;
    }
    let genome_ids: Vec<&str> = sorted.iter().map(|r| r.name.as_str()).collect();

    let quality_file = write_quality(&outputs.quality, quality, &genome_ids)?;
    let mut writer = FormattedWriter::create(outputs)?;
    for record in sorted {
        let fasta: Vec<(String, FastaRecord)> = record
            .protein_features()
            .map(|f| {
                let original = host_gene_id(&record.name, &f.id);
                let seq = FastaRecord {
                    id: original.clone(),
                    description: String::new(),
                    sequence: f.translation().unwrap_or_default().to_string(),
                };
                (original, seq)
            })
            .collect();
        writer.add_genome(&record.name, fasta.iter().map(|(id, r)| (id.clone(), r)))?;
    }
    let genes = writer.finish()?;
    quality_file.commit()?;

    Ok(FormatSummary {
        genomes: genome_ids.len(),
        genes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn outputs(dir: &Path) -> FormatOutputs {
        FormatOutputs {
            faa: dir.join("clade.faa"),
            quality: dir.join("clade.checkm"),
            id_map: dir.join("clade.gene_id_map"),
        }
    }

    #[test]
    fn genome_id_derivation() {
        assert_eq!(
            genome_id_from_path(Path::new("/db/GCF/000/GCF_000008665.1_protein.faa.gz")),
            "GCF_000008665.1"
        );
        assert_eq!(genome_id_from_path(Path::new("g1.fasta")), "g1");
        assert_eq!(genome_id_from_path(Path::new("g2.faa")), "g2");
    }

    #[test]
    fn split_generated() {
        assert_eq!(split_generated_id("GCF_000008665.1_12").unwrap(), ("GCF_000008665.1", 12));
        assert_eq!(split_generated_id("g1_1").unwrap(), ("g1", 1));
        assert!(split_generated_id("g1").is_err());
        assert!(split_generated_id("g1_x").is_err());
        assert!(split_generated_id("_3").is_err());
    }

    #[test]
    fn faa_list_rejects_duplicate_genomes() {
        let list = "a/g1.faa\n\nb/g1_protein.faa.gz\n";
        let err = read_faa_list(Cursor::new(list)).unwrap_err();
        assert!(err.to_string().contains("'g1'"));
    }

    #[test]
    fn quality_table_header_variants() {
        let t = QualityTable::parse(Cursor::new("Bin Id\tCompleteness\tContamination\ng1\t99.1\t0.5\n"))
            .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("g1").unwrap().completeness, "99.1");

        let t = QualityTable::parse(Cursor::new("accession\tc\tx\ng2\t80\t1\n")).unwrap();
        assert_eq!(t.get("g2").unwrap().contamination, "1");

        assert!(QualityTable::parse(Cursor::new("g1\t1\n")).is_err());
    }

    #[test]
    fn formats_genomes_in_sorted_order_with_per_genome_counters() {
        let dir = tempfile::tempdir().unwrap();
        let g2 = dir.path().join("g2.faa");
        let g1 = dir.path().join("g1_protein.faa");
        fs::write(&g2, ">x1 hypothetical\nMKV\n").unwrap();
        fs::write(&g1, ">WP_1.1 alpha\nMA\nMB\n>WP_2.1\nMC\n").unwrap();

        let list = format!("{}\n{}\n", g2.display(), g1.display());
        let files = read_faa_list(Cursor::new(list)).unwrap();
        let quality = QualityTable::parse(Cursor::new(
            "Bin Id\tCompleteness\tContamination\ng2\t90\t1\ng1\t95\t2\ng9\t50\t5\n",
        ))
        .unwrap();

        let out = outputs(dir.path());
        let summary = format_inputs(&files, &quality, &out).unwrap();
        assert_eq!(summary, FormatSummary { genomes: 2, genes: 3 });

        let faa = fs::read_to_string(&out.faa).unwrap();
        assert_eq!(faa, ">g1_1 alpha\nMAMB\n>g1_2\nMC\n>g2_1 hypothetical\nMKV\n");

        let id_map = fs::read_to_string(&out.id_map).unwrap();
        assert_eq!(id_map, "g1_1\tWP_1.1\ng1_2\tWP_2.1\ng2_1\tx1\n");

        let checkm = fs::read_to_string(&out.quality).unwrap();
        assert_eq!(
            checkm,
            "Bin Id\tCompleteness\tContamination\ng1\t95\t2\ng2\t90\t1\n"
        );
    }

    #[test]
    fn missing_quality_genome_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let g3 = dir.path().join("g3.faa");
        fs::write(&g3, ">p\nMK\n").unwrap();
        let files = BTreeMap::from([("g3".to_string(), g3)]);
        let quality = QualityTable::parse(Cursor::new("g1\t95\t2\n")).unwrap();

        let out = outputs(dir.path());
        let err = format_inputs(&files, &quality, &out).unwrap_err();
        assert!(matches!(err, Error::Lookup { ref key, .. } if key == "g3"));
        assert!(!out.faa.exists());
        assert!(!out.id_map.exists());
        assert!(!out.quality.exists());
    }

    #[test]
    fn empty_fasta_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let g1 = dir.path().join("g1.faa");
        fs::write(&g1, "").unwrap();
        let files = BTreeMap::from([("g1".to_string(), g1)]);
        let quality = QualityTable::parse(Cursor::new("g1\t95\t2\n")).unwrap();
        let out = outputs(dir.path());
        let err = format_inputs(&files, &quality, &out).unwrap_err();
        assert!(err.to_string().contains("missing or empty"));
        assert!(!out.faa.exists());
    }

    #[test]
    fn formats_host_genome_records() {
        let records: Vec<GenomeRecord> = vec![
            serde_json::from_str(
                r#"{"name": "gB", "features": [
                    {"id": "f1", "protein_translation": "MKV"},
                    {"id": "rna1"},
                    {"id": "f2", "protein_translation": "MAA"}]}"#,
            )
            .unwrap(),
            serde_json::from_str(
                r#"{"name": "gA", "features": [{"id": "x", "protein_translation": "MM"}]}"#,
            )
            .unwrap(),
        ];
        let mut quality = QualityTable::default();
        quality.insert("gA", "90.0", "2.0");
        quality.insert("gB", "80.0", "N/A");

        let dir = tempfile::tempdir().unwrap();
        let out = outputs(dir.path());
        let summary = format_genome_records(&records, &quality, &out).unwrap();
        assert_eq!(summary.genes, 3);
        assert_eq!(
            fs::read_to_string(&out.id_map).unwrap(),
            "gA_1\tgA.f:x\ngB_1\tgB.f:f1\ngB_2\tgB.f:f2\n"
        );
        assert_eq!(
            fs::read_to_string(&out.faa).unwrap(),
            ">gA_1\nMM\n>gB_1\nMKV\n>gB_2\nMAA\n"
        );
    }
}
