//! Pangenomer: gene-family clustering and completeness-aware pangenome assembly.

pub mod error;

pub mod annotation;
pub mod assemble;
pub mod cli;
pub mod config;
pub mod fasta;
pub mod format;
pub mod functions;
pub mod genome;
pub mod host;
pub mod mmseqs;
pub mod motupan;
pub mod pangenome;
pub mod pipeline;
pub mod postprocess;
pub mod runner;
pub mod tsv;
pub mod upa;
