//! Property tests for the tier policy and destination derivation

use camino::{Utf8Path, Utf8PathBuf};
use proptest::prelude::*;
use stemsplit::services::capability::HIGH_TIER_MIN_GB;
use stemsplit::services::paths::{destination_for, resolve};
use stemsplit::services::{CapabilityTier, select_tier};
use tempfile::TempDir;

fn file_stem_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 _-]{0,20}"
}

fn extension_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("mp3"), Just("wav"), Just("flac"), Just("ogg")].prop_map(str::to_string)
}

proptest! {
    #[test]
    fn test_tier_is_a_step_function(capacity in 0.0f64..1024.0) {
        let expected = if capacity >= HIGH_TIER_MIN_GB {
            CapabilityTier::High
        } else {
            CapabilityTier::Low
        };
        prop_assert_eq!(select_tier(capacity), expected);
    }

    #[test]
    fn test_tier_is_monotonic(a in 0.0f64..64.0, b in 0.0f64..64.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        if select_tier(low) == CapabilityTier::High {
            prop_assert_eq!(select_tier(high), CapabilityTier::High);
        }
    }

    #[test]
    fn test_destination_is_stems_slash_stem(
        dir in "[a-z]{1,8}(/[a-z]{1,8}){0,3}",
        stem in file_stem_strategy(),
        ext in extension_strategy(),
    ) {
        let input = Utf8PathBuf::from(format!("/{}/{}.{}", dir, stem, ext));
        let destination = destination_for(&input, Utf8Path::new("/out")).unwrap();

        prop_assert_eq!(destination, Utf8Path::new("/out").join("stems").join(&stem));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_resolve_is_idempotent(stem in file_stem_strategy(), ext in extension_strategy()) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let input = Utf8PathBuf::from(format!("/music/{}.{}", stem, ext));

        let first = resolve(&input, &root).unwrap();
        let second = resolve(&input, &root).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert!(first.is_dir());
    }
}

#[test]
fn test_tier_boundary() {
    assert_eq!(select_tier(HIGH_TIER_MIN_GB), CapabilityTier::High);
    assert_eq!(select_tier(3.999), CapabilityTier::Low);
    assert_eq!(select_tier(0.0), CapabilityTier::Low);
    assert_eq!(select_tier(f64::NAN), CapabilityTier::Low);
}
