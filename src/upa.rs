//! Object-store references (UPAs) and the dual-mode genome identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// An object-store address of the form `workspace/object/version`.
///
/// The version may be absent, e.g. in annotation tables keyed by `workspace/object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Upa {
    pub workspace: u64,
    pub object: u64,
    pub version: Option<u64>,
}

impl Upa {
    pub fn new(workspace: u64, object: u64, version: u64) -> Self {
        Self {
            workspace,
            object,
            version: Some(version),
        }
    }

    /// The version-less form used to match a genome across object versions.
    #[must_use]
    pub fn unversioned(self) -> Self {
        Self {
            version: None,
            ..self
        }
    }
}

impl fmt::Display for Upa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}/{}/{v}", self.workspace, self.object),
            None => write!(f, "{}/{}", self.workspace, self.object),
        }
    }
}

impl FromStr for Upa {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(Error::Parse(format!("invalid object reference: '{s}'")));
        }
        let num = |p: &str| {
            p.parse::<u64>()
                .map_err(|_| Error::Parse(format!("invalid object reference: '{s}'")))
        };
        Ok(Self {
            workspace: num(parts[0])?,
            object: num(parts[1])?,
            version: parts.get(2).map(|p| num(p)).transpose()?,
        })
    }
}

impl Serialize for Upa {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Upa {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How ortholog entries name their genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomeIdMode {
    /// Bare genome names, as used in standalone runs.
    Name,
    /// Object-store references, as used when genomes come from the host.
    Reference,
}

/// The genome column of an ortholog entry.
///
/// On the wire this is a plain string; a value shaped like a full
/// `ws/obj/ver` reference is read back as [`GenomeIdentifier::Reference`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenomeIdentifier {
    Name(String),
    Reference(Upa),
}

impl GenomeIdentifier {
    pub fn mode(&self) -> GenomeIdMode {
        match self {
            GenomeIdentifier::Name(_) => GenomeIdMode::Name,
            GenomeIdentifier::Reference(_) => GenomeIdMode::Reference,
        }
    }

    pub fn as_reference(&self) -> Option<Upa> {
        match self {
            GenomeIdentifier::Reference(upa) => Some(*upa),
            GenomeIdentifier::Name(_) => None,
        }
    }
}

impl fmt::Display for GenomeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenomeIdentifier::Name(name) => f.write_str(name),
            GenomeIdentifier::Reference(upa) => upa.fmt(f),
        }
    }
}

impl From<&str> for GenomeIdentifier {
    fn from(s: &str) -> Self {
        match s.parse::<Upa>() {
            Ok(upa) if upa.version.is_some() => GenomeIdentifier::Reference(upa),
            _ => GenomeIdentifier::Name(s.to_string()),
        }
    }
}

impl Serialize for GenomeIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GenomeIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(GenomeIdentifier::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let upa: Upa = "123/45/6".parse().unwrap();
        assert_eq!(upa, Upa::new(123, 45, 6));
        assert_eq!(upa.to_string(), "123/45/6");
        assert_eq!(upa.unversioned().to_string(), "123/45");

        let short: Upa = "123/45".parse().unwrap();
        assert_eq!(short.version, None);
        assert_eq!(short, upa.unversioned());
    }

    #[test]
    fn reject_malformed() {
        assert!("123".parse::<Upa>().is_err());
        assert!("a/b/c".parse::<Upa>().is_err());
        assert!("1/2/3/4".parse::<Upa>().is_err());
    }

    #[test]
    fn genome_identifier_from_wire() {
        assert_eq!(
            GenomeIdentifier::from("GCF_000008665.1"),
            GenomeIdentifier::Name("GCF_000008665.1".to_string())
        );
        assert_eq!(
            GenomeIdentifier::from("77/8/1"),
            GenomeIdentifier::Reference(Upa::new(77, 8, 1))
        );
        assert_eq!(GenomeIdentifier::from("77/8").mode(), GenomeIdMode::Name);
    }

    #[test]
    fn genome_identifier_serializes_as_string() {
        let ids = vec![
            GenomeIdentifier::Name("g1".to_string()),
            GenomeIdentifier::Reference(Upa::new(1, 2, 3)),
        ];
        let json = serde_json::to_string(&ids).unwrap();
        assert_eq!(json, r#"["g1","1/2/3"]"#);
        let back: Vec<GenomeIdentifier> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ids);
    }
}
