//! Factory for creating vector indexes from configuration.

use crate::error::Result;
use crate::vector::core::option::{IndexConfig, IndexKind};
use crate::vector::index::VectorIndex;
use crate::vector::index::flat::BruteForceIndex;
use crate::vector::index::lsh::LshIndex;

/// Factory for creating empty vector indexes.
pub struct IndexFactory;

impl IndexFactory {
    /// Construct an empty index of the given kind.
    pub fn create(kind: IndexKind, config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
        config.validate()?;

        let index: Box<dyn VectorIndex> = match kind {
            IndexKind::Lsh => Box::new(LshIndex::new(config.dimension, &config.lsh)?),
            IndexKind::BruteForce => Box::new(BruteForceIndex::new(
                config.dimension,
                config.brute_force.metric,
            )),
        };
        Ok(index)
    }

    /// Construct an index from a type tag such as `"lsh"` or `"bruteforce"`.
    pub fn create_from_name(name: &str, config: &IndexConfig) -> Result<Box<dyn VectorIndex>> {
        Self::create(name.parse()?, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuarryError;
    use crate::vector::core::distance::DistanceMetric;
    use crate::vector::core::option::{BruteForceOption, LshOption};

    #[test]
    fn test_create_each_kind() {
        let config = IndexConfig::new(8);
        let lsh = IndexFactory::create(IndexKind::Lsh, &config).unwrap();
        assert_eq!(lsh.kind(), IndexKind::Lsh);
        assert_eq!(lsh.dimension(), 8);
        assert!(lsh.as_any().downcast_ref::<LshIndex>().is_some());

        let flat = IndexFactory::create(IndexKind::BruteForce, &config).unwrap();
        assert_eq!(flat.kind(), IndexKind::BruteForce);
        assert!(flat.is_empty());
    }

    #[test]
    fn test_options_are_applied() {
        let config = IndexConfig::new(4)
            .lsh(LshOption::new().num_tables(3).num_hashes(6))
            .brute_force(BruteForceOption::new(DistanceMetric::Cosine));

        let lsh = IndexFactory::create(IndexKind::Lsh, &config).unwrap();
        let lsh = lsh.as_any().downcast_ref::<LshIndex>().unwrap();
        assert_eq!(lsh.num_tables(), 3);
        assert_eq!(lsh.num_hashes(), 6);

        let flat = IndexFactory::create(IndexKind::BruteForce, &config).unwrap();
        let flat = flat.as_any().downcast_ref::<BruteForceIndex>().unwrap();
        assert_eq!(flat.metric(), DistanceMetric::Cosine);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = IndexFactory::create(IndexKind::BruteForce, &IndexConfig::new(0)).unwrap_err();
        assert!(matches!(err, QuarryError::InvalidConfig(_)));

        let err = IndexFactory::create_from_name("annoy", &IndexConfig::new(4)).unwrap_err();
        assert!(matches!(err, QuarryError::UnknownIndexType(_)));
    }
}
