//! Prompt construction for the LLM-backed detector.

use super::kind::PiiKind;

/// System prompt establishing the detection task and output contract.
pub fn build_system_prompt(kinds: &[PiiKind]) -> String {
    let enabled_types = kinds
        .iter()
        .map(|kind| format!("- {}: {}", kind.as_str(), kind.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a PII detection system. Your task is to identify Personally \
         Identifiable Information (PII) in text.\n\n\
         PII types to detect:\n{enabled_types}\n\n\
         Rules:\n\
         1. Only detect PII that is clearly identifiable (high confidence)\n\
         2. Avoid false positives (e.g., \"Call me at 5PM\" is not a phone number)\n\
         3. Handle partial PII that may span across chunks\n\
         4. Copy each detected value verbatim from the text, character for character\n\
         5. Do not report a value that does not appear exactly in the text\n\n\
         Return results as JSON array only, no markdown or explanation."
    )
}

/// User prompt carrying the text to analyze.
pub fn build_detection_prompt(text: &str, kinds: &[PiiKind]) -> String {
    let types_list = kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Analyze the following text and detect all instances of Personally \
         Identifiable Information (PII).\n\n\
         PII types to detect: {types_list}\n\n\
         Text to analyze:\n\
         \"\"\"\n\
         {text}\n\
         \"\"\"\n\n\
         Return a JSON array of detected PII instances. Each instance should have:\n\
         - piiType: one of {types_list}\n\
         - value: the exact matched text, copied verbatim\n\
         - confidence: optional number between 0 and 1\n\n\
         Example format:\n\
         [\n\
           {{\n\
             \"piiType\": \"email\",\n\
             \"value\": \"alice@example.com\",\n\
             \"confidence\": 0.95\n\
           }}\n\
         ]\n\n\
         Return only valid JSON, no additional text. If no PII is found, return an empty array []."
    )
}
