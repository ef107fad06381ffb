//! Failure taxonomy and error types
//!
//! `FailureKind` is the closed set of conditions a check-in attempt can end
//! in. Each kind has a stable code and exactly one message per locale.
//! `ScanError` is the subset a card reader can report and `StoreError` is
//! what record store calls fail with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a check-in attempt can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    NotSupported,
    Disabled,
    ScanTimeout,
    InvalidCard,
    PilgrimNotFound,
    AlreadyOnboard,
    AlreadyOffboard,
    NetworkError,
    ServerError,
    UnknownError,
}

/// Message language for user-facing failure text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl FailureKind {
    pub const ALL: [FailureKind; 10] = [
        FailureKind::NotSupported,
        FailureKind::Disabled,
        FailureKind::ScanTimeout,
        FailureKind::InvalidCard,
        FailureKind::PilgrimNotFound,
        FailureKind::AlreadyOnboard,
        FailureKind::AlreadyOffboard,
        FailureKind::NetworkError,
        FailureKind::ServerError,
        FailureKind::UnknownError,
    ];

    /// Stable code, matches the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotSupported => "NOT_SUPPORTED",
            FailureKind::Disabled => "DISABLED",
            FailureKind::ScanTimeout => "SCAN_TIMEOUT",
            FailureKind::InvalidCard => "INVALID_CARD",
            FailureKind::PilgrimNotFound => "PILGRIM_NOT_FOUND",
            FailureKind::AlreadyOnboard => "ALREADY_ONBOARD",
            FailureKind::AlreadyOffboard => "ALREADY_OFFBOARD",
            FailureKind::NetworkError => "NETWORK_ERROR",
            FailureKind::ServerError => "SERVER_ERROR",
            FailureKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn message(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => self.message_en(),
            Locale::Ar => self.message_ar(),
        }
    }

    fn message_en(&self) -> &'static str {
        match self {
            FailureKind::NotSupported => "This device does not support card scanning",
            FailureKind::Disabled => "Card scanning is turned off. Enable it and try again",
            FailureKind::ScanTimeout => "No card detected. Hold the card closer and try again",
            FailureKind::InvalidCard => "The card could not be read",
            FailureKind::PilgrimNotFound => "No pilgrim is registered with this card",
            FailureKind::AlreadyOnboard => "This pilgrim is already on board",
            FailureKind::AlreadyOffboard => "This pilgrim has already left the bus",
            FailureKind::NetworkError => "Network error. Check the connection and try again",
            FailureKind::ServerError => "The server could not save the change",
            FailureKind::UnknownError => "An unexpected error occurred",
        }
    }

    fn message_ar(&self) -> &'static str {
        match self {
            FailureKind::NotSupported => "هذا الجهاز لا يدعم قراءة البطاقات",
            FailureKind::Disabled => "قراءة البطاقات متوقفة. فعّلها وحاول مرة أخرى",
            FailureKind::ScanTimeout => "لم يتم اكتشاف بطاقة. قرّب البطاقة وحاول مرة أخرى",
            FailureKind::InvalidCard => "تعذرت قراءة البطاقة",
            FailureKind::PilgrimNotFound => "لا يوجد حاج مسجل بهذه البطاقة",
            FailureKind::AlreadyOnboard => "هذا الحاج موجود بالفعل في الحافلة",
            FailureKind::AlreadyOffboard => "هذا الحاج غادر الحافلة بالفعل",
            FailureKind::NetworkError => "خطأ في الشبكة. تحقق من الاتصال وحاول مرة أخرى",
            FailureKind::ServerError => "تعذر على الخادم حفظ التغيير",
            FailureKind::UnknownError => "حدث خطأ غير متوقع",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a card reader for a single scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ScanError {
    #[error("card scanning not supported")]
    NotSupported,
    #[error("card scanning disabled")]
    Disabled,
    #[error("scan timed out")]
    Timeout,
    #[error("card read but no usable identifier")]
    InvalidCard,
    #[error("card reader error")]
    Unknown,
}

impl From<ScanError> for FailureKind {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NotSupported => FailureKind::NotSupported,
            ScanError::Disabled => FailureKind::Disabled,
            ScanError::Timeout => FailureKind::ScanTimeout,
            ScanError::InvalidCard => FailureKind::InvalidCard,
            ScanError::Unknown => FailureKind::UnknownError,
        }
    }
}

/// Record store call failure. Not-found is distinct from transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("network error: {0}")]
    Network(String),
    #[error("server error: {message}")]
    Server { status: Option<u16>, message: String },
}

impl StoreError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::NotFound => FailureKind::PilgrimNotFound,
            StoreError::Network(_) => FailureKind::NetworkError,
            StoreError::Server { .. } => FailureKind::ServerError,
        }
    }
}

/// Text that is not one of the two pilgrim statuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pilgrim status: {0:?}")]
pub struct StatusParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde() {
        for kind in FailureKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_every_kind_has_distinct_message() {
        for locale in [Locale::En, Locale::Ar] {
            let mut messages: Vec<&str> =
                FailureKind::ALL.iter().map(|k| k.message(locale)).collect();
            messages.sort_unstable();
            messages.dedup();
            assert_eq!(messages.len(), FailureKind::ALL.len());
        }
    }

    #[test]
    fn test_scan_error_mapping() {
        assert_eq!(FailureKind::from(ScanError::Timeout), FailureKind::ScanTimeout);
        assert_eq!(FailureKind::from(ScanError::Unknown), FailureKind::UnknownError);
        assert_eq!(FailureKind::from(ScanError::Disabled), FailureKind::Disabled);
    }

    #[test]
    fn test_store_error_kind() {
        assert_eq!(StoreError::NotFound.failure_kind(), FailureKind::PilgrimNotFound);
        assert_eq!(
            StoreError::Network("refused".to_string()).failure_kind(),
            FailureKind::NetworkError
        );
        let server = StoreError::Server { status: Some(500), message: "boom".to_string() };
        assert_eq!(server.failure_kind(), FailureKind::ServerError);
        assert_eq!(server.to_string(), "server error: boom");
    }
}
