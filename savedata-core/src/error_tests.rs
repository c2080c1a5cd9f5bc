/*!
Tests for error handling and error types.
*/

#[cfg(test)]
mod tests {
    use crate::error::SaveDataError;
    use crate::value::Brand;
    use std::io;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").unwrap_err()
    }

    #[test]
    fn test_save_data_error_display() {
        let error = SaveDataError::validation("test validation error");
        assert_eq!(error.to_string(), "Validation error: test validation error");

        let error = SaveDataError::slot("test slot error");
        assert_eq!(error.to_string(), "Save slot error: test slot error");

        let error = SaveDataError::observability("no subscriber");
        assert_eq!(error.to_string(), "Observability error: no subscriber");
    }

    #[test]
    fn test_feature_errors_name_the_feature() {
        let error = SaveDataError::DuplicateFeature("hp".to_string());
        assert_eq!(
            error.to_string(),
            "The save data manager is already managing save data for a feature of: hp"
        );

        let error = SaveDataError::UnknownFeature("mp".to_string());
        assert!(error.to_string().ends_with("feature of: mp"));

        let error = SaveDataError::TornDown("late".to_string());
        assert!(error.to_string().contains("late"));
    }

    #[test]
    fn test_brand_errors_name_brand_field_and_path() {
        let error = SaveDataError::missing_field(Brand::Rng, "seed", "dice > persistent > rng");
        let message = error.to_string();
        assert!(message.contains("rng"));
        assert!(message.contains("\"seed\""));
        assert!(message.contains("dice > persistent > rng"));

        let error = SaveDataError::malformed(Brand::DefaultMap, "counts", "entry is not a pair");
        assert_eq!(
            error.to_string(),
            "Failed to deserialize default-map at \"counts\": entry is not a pair"
        );
    }

    #[test]
    fn test_unsupported_type_error() {
        let error = SaveDataError::unsupported("Entity", "spawner > room > target");
        assert_eq!(
            error.to_string(),
            "Unsupported type \"Entity\" at \"spawner > room > target\""
        );
    }

    #[test]
    fn test_save_data_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = SaveDataError::from(io_error);

        match error {
            SaveDataError::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_save_data_error_from_json_error() {
        let error = SaveDataError::from(json_error());

        match error {
            SaveDataError::Json(_) => {}
            _ => panic!("Expected Json error variant"),
        }
    }

    #[test]
    fn test_integrity_check_failed_error() {
        let error = SaveDataError::IntegrityCheckFailed {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };

        assert!(error.to_string().contains("abc123"));
        assert!(error.to_string().contains("def456"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SaveDataError>();
        assert_sync::<SaveDataError>();
    }

    #[test]
    fn test_error_chain() {
        let root_cause = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        let error = SaveDataError::from(root_cause);

        match error {
            SaveDataError::Io(ref io_err) => {
                assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_variants_coverage() {
        let _io_error = SaveDataError::Io(io::Error::new(io::ErrorKind::Other, "test"));
        let _json_error = SaveDataError::Json(json_error());
        let _not_initialized = SaveDataError::NotInitialized;
        let _unknown_factory = SaveDataError::UnknownFactory {
            name: "zero".to_string(),
            path: "a".to_string(),
        };
        let _unknown_class = SaveDataError::UnknownClass {
            name: "Loadout".to_string(),
            path: "a".to_string(),
        };
        let _live = SaveDataError::UnexpectedLiveValue {
            type_name: "Map".to_string(),
            path: "a".to_string(),
        };
        let _key = SaveDataError::InvalidKey {
            path: "a".to_string(),
            reason: "brand used as a map key".to_string(),
        };
        let _format_error = SaveDataError::invalid_format("test");
    }

    #[test]
    fn test_error_result_type() {
        fn returns_error() -> crate::Result<()> {
            Err(SaveDataError::validation("test error"))
        }

        let result = returns_error();
        assert!(result.is_err());
    }
}
