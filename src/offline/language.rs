use serde::{Deserialize, Serialize};

/// Languages the app is localized into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Hi,
  #[default]
  En,
  Te,
  Kn,
  Ml,
  Ta,
}

impl Language {
  pub const ALL: [Language; 6] = [
    Language::Hi,
    Language::En,
    Language::Te,
    Language::Kn,
    Language::Ml,
    Language::Ta,
  ];

  pub fn code(&self) -> &'static str {
    match self {
      Language::Hi => "hi",
      Language::En => "en",
      Language::Te => "te",
      Language::Kn => "kn",
      Language::Ml => "ml",
      Language::Ta => "ta",
    }
  }

  /// Resolve a language code; anything unsupported (or empty) is English.
  pub fn from_code(code: &str) -> Self {
    let code = code.trim().to_lowercase();
    Self::ALL
      .into_iter()
      .find(|lang| lang.code() == code)
      .unwrap_or_default()
  }
}

impl std::fmt::Display for Language {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.code())
  }
}
