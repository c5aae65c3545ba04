use serde::{Deserialize, Serialize};

/// Display language for user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Ar,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "en" | "en-us" | "english" => Some(Locale::En),
            "ar" | "ar-sa" | "arabic" => Some(Locale::Ar),
            _ => None,
        }
    }
}

/// A message carried in both storefront languages.
///
/// The oracle sends `message` and `messageAr` side by side; either may be
/// missing, in which case the other is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMessage {
    pub en: Option<String>,
    pub ar: Option<String>,
}

impl LocalizedMessage {
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: Some(en.into()),
            ar: Some(ar.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.en.is_none() && self.ar.is_none()
    }

    /// Pick the text for `locale`, falling back to the other language.
    pub fn resolve(&self, locale: Locale) -> Option<&str> {
        let (preferred, fallback) = match locale {
            Locale::En => (&self.en, &self.ar),
            Locale::Ar => (&self.ar, &self.en),
        };
        preferred.as_deref().or(fallback.as_deref())
    }

    /// Use `self` when it has any text, otherwise `default`.
    pub fn or(self, default: LocalizedMessage) -> LocalizedMessage {
        if self.is_empty() { default } else { self }
    }

    pub fn payment_succeeded() -> Self {
        Self::new(
            "Payment confirmed. Your subscription is now active.",
            "تم تأكيد الدفع. اشتراكك مفعل الآن.",
        )
    }

    pub fn payment_failed() -> Self {
        Self::new(
            "Payment failed. Please try again.",
            "فشلت عملية الدفع. يرجى المحاولة مرة أخرى.",
        )
    }
}
