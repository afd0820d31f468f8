use std::fmt::Write;
use std::io::Cursor;

use criterion::{Criterion, criterion_group, criterion_main};

use pangenomer::assemble::Assembler;
use pangenomer::mmseqs::ClusterMembership;
use pangenomer::motupan::EstimatorOutput;
use pangenomer::tsv::IdMap;

const GENOMES: usize = 50;
const CLUSTERS: usize = 4_000;

/// Gene ID map, cluster table and estimator output. Cluster `c` holds one
/// gene from each of the first `GENOMES / 2 + c % (GENOMES / 2)` genomes.
fn synthetic_text() -> (String, String, String) {
    let mut id_map = String::new();
    let mut clusters = String::new();
    let mut estimator = String::new();

    let genome_list: Vec<String> = (1..=GENOMES)
        .map(|g| format!("genome{g}:prior_complete=90.0:posterior_complete=95.0"))
        .collect();
    writeln!(estimator, "#mOTUlizer:mOTUpan:0.3.2").unwrap();
    writeln!(estimator, "#run_name=bench").unwrap();
    writeln!(estimator, "#genome_count={GENOMES}").unwrap();
    writeln!(estimator, "#core_length={}", CLUSTERS / 2).unwrap();
    writeln!(estimator, "#mean_est_genome_size=3500.0").unwrap();
    writeln!(estimator, "#genomes={}", genome_list.join(";")).unwrap();

    for c in 1..=CLUSTERS {
        let members = GENOMES / 2 + c % (GENOMES / 2);
        let rep = format!("genome1_{c}");
        for g in 1..=members {
            let gene = format!("genome{g}_{c}");
            writeln!(id_map, "{gene}\tlocus_{g}_{c}").unwrap();
            writeln!(clusters, "{rep}\t{gene}").unwrap();
        }
        let category = if members > GENOMES * 9 / 10 { "core" } else { "accessory" };
        writeln!(estimator, "{rep}\t{category}\t{members}\t-1.5\t1.0\tNA\tNA").unwrap();
    }

    (id_map, clusters, estimator)
}

fn synthetic_run() -> (IdMap, ClusterMembership, EstimatorOutput) {
    let (id_map, clusters, estimator) = synthetic_text();
    (
        IdMap::parse("gene ID map", Cursor::new(id_map)).unwrap(),
        ClusterMembership::parse(Cursor::new(clusters)).unwrap(),
        EstimatorOutput::parse(Cursor::new(estimator)).unwrap(),
    )
}

fn bench_assemble(c: &mut Criterion) {
    let (id_map, membership, estimator) = synthetic_run();
    let assembler = Assembler::new(&id_map);

    c.bench_function("assemble (50 genomes, 4000 clusters)", |b| {
        b.iter(|| {
            let pg = assembler
                .assemble("bench.Pangenome", &estimator, &membership)
                .unwrap();
            assert_eq!(pg.orthologs.len(), CLUSTERS);
        });
    });
}

fn bench_parse_estimator(c: &mut Criterion) {
    let (_, _, estimator) = synthetic_text();

    c.bench_function("parse estimator output (4000 rows)", |b| {
        b.iter(|| {
            let out = EstimatorOutput::parse(Cursor::new(estimator.as_bytes())).unwrap();
            assert_eq!(out.rows.len(), CLUSTERS);
        });
    });
}

criterion_group!(benches, bench_assemble, bench_parse_estimator);
criterion_main!(benches);
