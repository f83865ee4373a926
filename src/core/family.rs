use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An architecture lineage sharing one configuration shape and one body computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "t5")]
    T5,
    #[serde(rename = "distilbert")]
    DistilBert,
    #[serde(rename = "albert")]
    Albert,
    #[serde(rename = "camembert")]
    Camembert,
    #[serde(rename = "xlm-roberta")]
    XlmRoberta,
    #[serde(rename = "roberta")]
    Roberta,
    #[serde(rename = "mobilebert")]
    MobileBert,
    #[serde(rename = "flaubert")]
    Flaubert,
    #[serde(rename = "bert")]
    Bert,
    #[serde(rename = "openai-gpt")]
    OpenAiGpt,
    #[serde(rename = "gpt2")]
    Gpt2,
    #[serde(rename = "transfo-xl")]
    TransfoXl,
    #[serde(rename = "xlnet")]
    XlNet,
    #[serde(rename = "xlm")]
    Xlm,
    #[serde(rename = "ctrl")]
    Ctrl,
    #[serde(rename = "electra")]
    Electra,
}

/// How a family carries state between forward calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    None,
    /// Fixed-length recurrent memory of previous segments (`mem_len` positions).
    Recurrent,
    /// Key/value state that grows with every step.
    KeyValue,
}

impl Family {
    /// Identifier markers in match order. A marker that textually contains another
    /// marker is listed before it.
    pub const MARKER_ORDER: [Family; 16] = [
        Family::T5,
        Family::DistilBert,
        Family::Albert,
        Family::Camembert,
        Family::XlmRoberta,
        Family::Roberta,
        Family::MobileBert,
        Family::Flaubert,
        Family::Bert,
        Family::OpenAiGpt,
        Family::Gpt2,
        Family::TransfoXl,
        Family::XlNet,
        Family::Xlm,
        Family::Ctrl,
        Family::Electra,
    ];

    pub fn marker(self) -> &'static str {
        match self {
            Family::T5 => "t5",
            Family::DistilBert => "distilbert",
            Family::Albert => "albert",
            Family::Camembert => "camembert",
            Family::XlmRoberta => "xlm-roberta",
            Family::Roberta => "roberta",
            Family::MobileBert => "mobilebert",
            Family::Flaubert => "flaubert",
            Family::Bert => "bert",
            Family::OpenAiGpt => "openai-gpt",
            Family::Gpt2 => "gpt2",
            Family::TransfoXl => "transfo-xl",
            Family::XlNet => "xlnet",
            Family::Xlm => "xlm",
            Family::Ctrl => "ctrl",
            Family::Electra => "electra",
        }
    }

    pub fn markers() -> Vec<String> {
        Self::MARKER_ORDER.iter().map(|f| f.marker().to_string()).collect()
    }

    /// First family whose marker occurs in `identifier`.
    pub fn from_identifier(identifier: &str) -> Option<Family> {
        Self::MARKER_ORDER
            .iter()
            .copied()
            .find(|family| identifier.contains(family.marker()))
    }

    /// The family this one copies its defaults and behavior from.
    pub fn parent(self) -> Option<Family> {
        match self {
            Family::Roberta => Some(Family::Bert),
            Family::Camembert | Family::XlmRoberta => Some(Family::Roberta),
            Family::Flaubert => Some(Family::Xlm),
            _ => None,
        }
    }

    pub fn lineage(self) -> impl Iterator<Item = Family> {
        std::iter::successors(Some(self), |f| f.parent())
    }

    /// True when `self` equals `other` or descends from it.
    pub fn is_subtype_of(self, other: Family) -> bool {
        self.lineage().any(|f| f == other)
    }

    /// Stem of the concrete class names, e.g. `GPT2` in `GPT2LMHeadModel`.
    pub fn class_stem(self) -> &'static str {
        match self {
            Family::T5 => "T5",
            Family::DistilBert => "DistilBert",
            Family::Albert => "Albert",
            Family::Camembert => "Camembert",
            Family::XlmRoberta => "XLMRoberta",
            Family::Roberta => "Roberta",
            Family::MobileBert => "MobileBert",
            Family::Flaubert => "Flaubert",
            Family::Bert => "Bert",
            Family::OpenAiGpt => "OpenAIGPT",
            Family::Gpt2 => "GPT2",
            Family::TransfoXl => "TransfoXL",
            Family::XlNet => "XLNet",
            Family::Xlm => "XLM",
            Family::Ctrl => "CTRL",
            Family::Electra => "Electra",
        }
    }

    /// Parameter prefix of the body inside a head model.
    pub fn base_prefix(self) -> &'static str {
        match self {
            Family::Bert => "bert",
            Family::Roberta | Family::Camembert | Family::XlmRoberta => "roberta",
            Family::DistilBert => "distilbert",
            Family::Albert => "albert",
            Family::Electra => "electra",
            Family::MobileBert => "mobilebert",
            Family::T5
            | Family::OpenAiGpt
            | Family::Gpt2
            | Family::TransfoXl
            | Family::XlNet
            | Family::Xlm
            | Family::Flaubert
            | Family::Ctrl => "transformer",
        }
    }

    pub fn memory_kind(self) -> MemoryKind {
        match self {
            Family::TransfoXl | Family::XlNet => MemoryKind::Recurrent,
            Family::Gpt2 | Family::Ctrl => MemoryKind::KeyValue,
            _ => MemoryKind::None,
        }
    }

    pub fn is_encoder_decoder(self) -> bool {
        self == Family::T5
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Config", self.class_stem())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::MARKER_ORDER
            .iter()
            .copied()
            .find(|family| family.marker() == s)
            .ok_or_else(|| Error::UnrecognizedIdentifier {
                identifier: s.to_string(),
                markers: Self::markers(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_marker_selects_its_family() {
        for family in Family::MARKER_ORDER {
            let identifier = format!("{}-base-cased", family.marker());
            assert_eq!(Family::from_identifier(&identifier), Some(family));
        }
    }

    #[test]
    fn test_contained_markers_come_later() {
        let order = Family::MARKER_ORDER;
        for (i, outer) in order.iter().enumerate() {
            for (j, inner) in order.iter().enumerate() {
                if i != j && outer.marker().contains(inner.marker()) {
                    assert!(i < j, "{} must precede {}", outer.marker(), inner.marker());
                }
            }
        }
    }

    #[test]
    fn test_specific_marker_wins() {
        assert_eq!(Family::from_identifier("roberta-large"), Some(Family::Roberta));
        assert_eq!(Family::from_identifier("camembert-base"), Some(Family::Camembert));
        assert_eq!(Family::from_identifier("xlm-roberta-base"), Some(Family::XlmRoberta));
        assert_eq!(Family::from_identifier("xlm-mlm-en-2048"), Some(Family::Xlm));
        assert_eq!(Family::from_identifier("distilbert-base-uncased"), Some(Family::DistilBert));
        assert_eq!(Family::from_identifier("bert-base-uncased"), Some(Family::Bert));
        assert_eq!(Family::from_identifier("unrelated"), None);
    }

    #[test]
    fn test_lineage() {
        assert!(Family::Camembert.is_subtype_of(Family::Roberta));
        assert!(Family::Camembert.is_subtype_of(Family::Bert));
        assert!(Family::Flaubert.is_subtype_of(Family::Xlm));
        assert!(!Family::Bert.is_subtype_of(Family::Roberta));
        assert!(!Family::DistilBert.is_subtype_of(Family::Bert));
    }

    #[test]
    fn test_tag_roundtrip() {
        for family in Family::MARKER_ORDER {
            let tag = serde_json::to_value(family).unwrap();
            assert_eq!(tag, serde_json::Value::String(family.marker().to_string()));
            assert_eq!(family.marker().parse::<Family>().unwrap(), family);
        }
    }
}
