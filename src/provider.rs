//! Model artifact providers

use crate::error::TierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported artifact providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// HuggingFace Hub (`organization/model-name`)
    HuggingFace,
    /// Ollama registry (`model-name[:tag]`)
    Ollama,
    /// vLLM, which serves HuggingFace repositories
    Vllm,
}

impl Provider {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::Ollama => "ollama",
            Self::Vllm => "vllm",
        }
    }

    /// Name of the identifier grammar used to validate this provider's ids
    pub fn grammar(&self) -> &'static str {
        match self {
            Self::HuggingFace | Self::Vllm => "huggingface",
            Self::Ollama => "ollama",
        }
    }

    /// All providers
    pub fn all() -> &'static [Self] {
        &[Self::HuggingFace, Self::Ollama, Self::Vllm]
    }

    /// Rough artifact size in GB, derived from the parameter count in the id
    ///
    /// Ollama artifacts are quantized, so known families use their published
    /// download sizes. Otherwise `<n>b` means `n` billion fp16 parameters
    /// (2 GB each) and `<n>m` means `n` million. Falls back to 10 GB.
    pub fn estimate_size_gb(&self, model_id: &str) -> u64 {
        let lower = model_id.to_ascii_lowercase();

        if *self == Self::Ollama {
            if let Some(gb) = ollama_quantized_size(&lower) {
                return gb;
            }
        }

        if let Some(billions) = digits_before(&lower, 'b') {
            return ((billions * 2.0) as u64).max(1);
        }
        if let Some(millions) = digits_before(&lower, 'm') {
            return ((millions * 0.001 * 2.0) as u64).max(1);
        }

        10
    }
}

/// Published download sizes for common quantized Ollama families
const OLLAMA_SIZES: &[(&str, &[(&str, u64)])] = &[
    ("llama2", &[("7b", 4), ("13b", 8), ("70b", 40)]),
    ("llama3", &[("8b", 5), ("70b", 40)]),
    ("mixtral", &[("8x7b", 26), ("8x22b", 65)]),
    ("mistral", &[("7b", 4)]),
    ("codellama", &[("7b", 4), ("13b", 8), ("34b", 20), ("70b", 40)]),
    ("phi", &[("2.7b", 2)]),
    ("gemma", &[("2b", 2), ("7b", 5)]),
    (
        "qwen",
        &[
            ("0.5b", 1),
            ("1.8b", 2),
            ("14b", 9),
            ("32b", 20),
            ("72b", 42),
            ("4b", 3),
            ("7b", 5),
        ],
    ),
];

fn ollama_quantized_size(lower: &str) -> Option<u64> {
    let (base, tag) = lower.split_once(':').unwrap_or((lower, "latest"));
    OLLAMA_SIZES
        .iter()
        .filter(|(family, _)| base.contains(family))
        .flat_map(|(_, sizes)| sizes.iter())
        .find(|(size, _)| tag.contains(size) || base.contains(size))
        .map(|(_, gb)| *gb)
}

/// First run of ASCII digits immediately followed by `suffix`
fn digits_before(s: &str, suffix: char) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if !bytes[start].is_ascii_digit() {
            start += 1;
            continue;
        }
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == suffix as u8 {
            return s[start..end].parse().ok();
        }
        start = end;
    }
    None
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = TierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" => Ok(Self::Ollama),
            "vllm" => Ok(Self::Vllm),
            _ => Err(TierError::UnknownProvider(s.to_string())),
        }
    }
}
