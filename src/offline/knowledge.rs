//! Embedded symptom knowledge base.

use super::language::Language;

/// Canned guidance for one symptom.
#[derive(Debug)]
pub struct KnowledgeEntry {
  pub symptom: &'static str,
  /// Lowercase substrings that select this entry; the symptom name comes first
  pub keywords: &'static [&'static str],
  pub replies: &'static [(Language, &'static str)],
}

impl KnowledgeEntry {
  /// Reply in `language`, if one was written for it.
  pub fn reply(&self, language: Language) -> Option<&'static str> {
    self
      .replies
      .iter()
      .find(|(lang, _)| *lang == language)
      .map(|(_, text)| *text)
  }

  /// Reply in `language`, falling back to English.
  pub fn reply_or_english(&self, language: Language) -> &'static str {
    self
      .reply(language)
      .or_else(|| self.reply(Language::En))
      .unwrap_or_default()
  }
}

/// Matched in this order; the first hit wins.
pub static KNOWLEDGE_BASE: &[KnowledgeEntry] = &[
  KnowledgeEntry {
    symptom: "fever",
    keywords: &["fever", "बुखार"],
    replies: &[
      (
        Language::Hi,
        "बुखार के लिए आराम करें, पानी पिएं। 102°F से ज्यादा हो तो डॉक्टर से मिलें।",
      ),
      (Language::En, "For fever: rest, drink fluids. See doctor if >102°F."),
    ],
  },
  KnowledgeEntry {
    symptom: "headache",
    keywords: &["headache", "सिरदर्द"],
    replies: &[
      (
        Language::Hi,
        "सिरदर्द के लिए आराम करें, पानी पिएं। बहुत तेज हो तो डॉक्टर से मिलें।",
      ),
      (Language::En, "For headache: rest, hydrate. See doctor if severe."),
    ],
  },
  KnowledgeEntry {
    symptom: "cough",
    keywords: &["cough", "cold", "खांसी"],
    replies: &[
      (
        Language::Hi,
        "खांसी-जुकाम के लिए गर्म पानी पिएं, भाप लें, आराम करें। 1 सप्ताह से ज्यादा हो तो डॉक्टर से मिलें।",
      ),
      (
        Language::En,
        "For cold/cough: drink warm water, take steam, rest. See doctor if it lasts >1 week.",
      ),
    ],
  },
];
