//! Property tests for collection ids and version targeting

use proptest::prelude::*;
use remote_settings_core::{evaluate, AppContext, ClientConfig, CollectionKey};

proptest! {
    #[test]
    fn prop_ids_with_separator_are_rejected(
        prefix in "[a-z0-9_-]{0,12}",
        suffix in "[a-z0-9_-]{0,12}",
    ) {
        let id = format!("{prefix}/{suffix}");
        prop_assert!(ClientConfig::default().key_for(&id).is_err());
    }

    #[test]
    fn prop_valid_keys_parse_back(bucket in "[a-z0-9_-]{1,16}", collection in "[a-z0-9_-]{1,32}") {
        let key = CollectionKey::try_new(&bucket, &collection).unwrap();
        let parsed: CollectionKey = key.to_string().parse().unwrap();
        prop_assert_eq!(parsed, key);
    }

    #[test]
    fn prop_version_targeting_orders_numerically(
        current in (0u32..300, 0u32..20, 0u32..20),
        target in (0u32..300, 0u32..20, 0u32..20),
    ) {
        let context = AppContext {
            version: format!("{}.{}.{}", current.0, current.1, current.2),
            ..AppContext::default()
        };
        let target_version = format!("{}.{}.{}", target.0, target.1, target.2);

        let below = evaluate(&format!("env.version < '{target_version}'"), &context).unwrap();
        let at_least = evaluate(&format!("env.version >= '{target_version}'"), &context).unwrap();
        prop_assert_eq!(below, current < target);
        prop_assert_eq!(at_least, current >= target);
    }
}
