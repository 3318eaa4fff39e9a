//! Maps `Box<dyn Error>` from the `LearningStore` boundary to typed `EngineError`.
//!
//! With the `store-errors` feature, `bolus_store::StoreError` is downcast for
//! precise mapping; other stores fall back to the message text.

use crate::error::EngineError;

pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> EngineError {
    #[cfg(feature = "store-errors")]
    {
        if let Some(se) = e.downcast_ref::<bolus_store::StoreError>() {
            return match se {
                bolus_store::StoreError::Io(io) => EngineError::StoreIo(io.to_string()),
                bolus_store::StoreError::Corrupt { .. } => {
                    EngineError::StoreCorrupt(se.to_string())
                }
                bolus_store::StoreError::Encoding(_) => EngineError::Store(se.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return EngineError::StoreIo(io.to_string());
    }
    EngineError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_io_errors_are_io() {
        let e = std::io::Error::other("disk gone");
        assert_eq!(map_store_error(&e), EngineError::StoreIo("disk gone".into()));
    }

    #[test]
    fn unknown_errors_keep_their_text() {
        let e: Box<dyn std::error::Error + Send + Sync> = "nope".into();
        assert_eq!(map_store_error(&*e), EngineError::Store("nope".into()));
    }

    #[cfg(feature = "store-errors")]
    #[test]
    fn typed_store_errors_are_downcast() {
        let e = bolus_store::StoreError::Corrupt {
            path: "p.json".into(),
            reason: "eof".into(),
        };
        assert!(matches!(map_store_error(&e), EngineError::StoreCorrupt(_)));
        let e = bolus_store::StoreError::Io(std::io::Error::other("ro"));
        assert_eq!(map_store_error(&e), EngineError::StoreIo("ro".into()));
    }
}
