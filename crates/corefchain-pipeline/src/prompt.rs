//! Prompt templates and request payloads

use crate::config::PipelineConfig;
use crate::coref::CorefMemory;
use crate::error::PipelineError;
use corefchain_domain::{CandidateCluster, EntityCategory, Mention, MentionKind};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Preambles prepended to the extraction template on attempts after the first
pub const FALLBACK_PREAMBLES: [&str; 4] = [
    r#"You must return valid JSON only. Do not add comments or explanations.
All items in any list MUST be quoted strings.
DO NOT write phrases like "is not mentioned" or "not present".
If an entity is not found, return an empty list or empty object.

Return JSON in exactly this structure:

{
  "ENTITIES": {
    "PROPER_NOUN": ["Example Name"],
    "NOUN_PHRASE": ["Example Phrase"]
  },
  "PROPER_NOUN_DESCRIPTION": {
    "Example Name": "Short factual description from text"
  }
}

Begin JSON:"#,
    r#"Output only JSON. No natural language allowed anywhere.
Lists must contain only quoted strings.
Do not justify missing entities. If nothing is found, output [] or {}.

Required JSON format (use these keys exactly):

{
  "ENTITIES": {
    "PROPER_NOUN": ["X"],
    "NOUN_PHRASE": ["Y"]
  },
  "PROPER_NOUN_DESCRIPTION": {
    "X": "Short factual description"
  }
}

Start your JSON response below this line:"#,
    r#"Return a JSON object. Nothing except JSON is allowed.
List entries must be plain quoted strings.
No explanations, reasons, or comments allowed.
Entities not present should be represented as [] or {}.

Model output schema:

{
  "ENTITIES": {
    "PROPER_NOUN": ["Entity1", "Entity2"],
    "NOUN_PHRASE": ["Phrase1", "Phrase2"]
  },
  "PROPER_NOUN_DESCRIPTION": {
    "Entity1": "Description",
    "Entity2": "Description"
  }
}

Produce JSON now:"#,
    r#"Contract: You will output valid JSON only.
Violation conditions: Any commentary, explanations, or unquoted text inside lists.
All list items must be quoted strings. No exceptions.
Missing entities: return empty lists or an empty object.

Schema to follow:

{
  "ENTITIES": {
    "PROPER_NOUN": ["A"],
    "NOUN_PHRASE": ["B"]
  },
  "PROPER_NOUN_DESCRIPTION": {
    "A": "Short description"
  }
}

Insert your JSON here:"#,
];

/// Extraction template for the given attempt (1-based)
pub fn extraction_template(base: &str, attempt: usize) -> String {
    if attempt <= 1 {
        return base.to_string();
    }
    let preamble = FALLBACK_PREAMBLES[(attempt - 2) % FALLBACK_PREAMBLES.len()];
    format!("{}\n\n{}", preamble, base.trim())
}

/// Built-in extraction template
pub fn default_ner_template(category: EntityCategory) -> String {
    let label = category.label();
    format!(
        "You are a {label} entity extraction API for legal case narratives.\n\
         List every mention of a {label} entity in the text below, exactly as it is written.\n\
         Put names in PROPER_NOUN and descriptive references (\"the driver\") in NOUN_PHRASE.\n\
         Give a short factual description of each proper noun, taken only from the text.\n\
         Return ONLY a JSON object of this form:\n\
         {{\"ENTITIES\": {{\"PROPER_NOUN\": [], \"NOUN_PHRASE\": []}}, \"PROPER_NOUN_DESCRIPTION\": {{}}}}"
    )
}

/// Built-in coreference proposal template
pub fn default_coref_template(category: EntityCategory) -> String {
    let label = category.label();
    format!(
        "You resolve coreferences between {label} entities in a legal case narrative.\n\
         RESOLVED_ENTITIES maps every mention seen so far to its canonical name.\n\
         AUXILIARY_DESCRIPTIONS holds what is known about each canonical name.\n\
         For every entity in IDENTIFIED_ENTITIES, map it to an existing canonical name when it \
         refers to the same {label}, to a new canonical name otherwise, or to null when unsure.\n\
         Return ONLY a JSON object with the keys RESOLVED_ENTITIES and AUXILIARY_DESCRIPTIONS."
    )
}

/// Built-in verification template
pub fn default_verify_template(category: EntityCategory) -> String {
    let label = category.label();
    format!(
        "You verify coreference clusters of {label} entities in a legal case narrative.\n\
         Decide whether ALL the mentions in MENTIONS refer to the same real-world {label}, \
         using the CONTEXTS they appear in.\n\
         If they do, give the canonical name to use for all of them.\n\
         Return ONLY a JSON object: {{\"SAME_ENTITY\": true or false, \"CANONICAL_LABEL\": \"name or null\"}}"
    )
}

/// Templates used by one category pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPrompts {
    /// Extraction template
    pub ner: String,

    /// Coreference proposal template
    pub coref: String,

    /// Verification template
    pub verify: String,
}

impl CategoryPrompts {
    /// Built-in templates for a category
    pub fn defaults(category: EntityCategory) -> Self {
        Self {
            ner: default_ner_template(category),
            coref: default_coref_template(category),
            verify: default_verify_template(category),
        }
    }
}

/// Every template of a run, read once at start
#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    prompts: HashMap<EntityCategory, CategoryPrompts>,
}

impl PromptSet {
    /// Built-in templates for every category
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Read the template files named by the configuration
    ///
    /// Relative paths are resolved against `base_dir`. A configured file that
    /// cannot be read is a configuration error.
    pub fn load(config: &PipelineConfig, base_dir: &Path) -> Result<Self, PipelineError> {
        let mut prompts = HashMap::new();
        for entry in &config.categories {
            let mut set = CategoryPrompts::defaults(entry.category);
            if let Some(path) = &entry.ner.prompt_file {
                set.ner = read_template(&base_dir.join(path))?;
            }
            if let Some(path) = &entry.coref.prompt_file {
                set.coref = read_template(&base_dir.join(path))?;
            }
            if let Some(path) = &entry.coref.verify_prompt_file {
                set.verify = read_template(&base_dir.join(path))?;
            }
            prompts.insert(entry.category, set);
        }
        Ok(Self { prompts })
    }

    /// Replace the templates of one category
    pub fn insert(&mut self, category: EntityCategory, prompts: CategoryPrompts) {
        self.prompts.insert(category, prompts);
    }

    /// Templates of a category (built-in ones when none were loaded)
    pub fn get(&self, category: EntityCategory) -> CategoryPrompts {
        self.prompts
            .get(&category)
            .cloned()
            .unwrap_or_else(|| CategoryPrompts::defaults(category))
    }
}

fn read_template(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!("Cannot read prompt file {}: {}", path.display(), e))
    })
}

/// Input of a coreference proposal call for one segment
pub fn proposal_payload(
    memory: &CorefMemory,
    mentions: &[&Mention],
    descriptions: &BTreeMap<String, String>,
    segment_text: &str,
) -> Result<String, PipelineError> {
    let mut proper_nouns: Vec<&str> = Vec::new();
    let mut noun_phrases: Vec<&str> = Vec::new();
    for mention in mentions {
        let list = match mention.kind {
            MentionKind::ProperNoun => &mut proper_nouns,
            MentionKind::NounPhrase => &mut noun_phrases,
        };
        if !list.contains(&mention.text.as_str()) {
            list.push(&mention.text);
        }
    }

    let payload = json!({
        "RESOLVED_ENTITIES": memory.resolved_entities,
        "AUXILIARY_DESCRIPTIONS": memory.auxiliary_descriptions,
        "IDENTIFIED_ENTITIES": {
            "NER_ENTITIES": {
                "PROPER_NOUN": proper_nouns,
                "NOUN_PHRASE": noun_phrases,
            },
            "PROPER_NOUN_DESCRIPTION": descriptions,
        },
        "CHUNK_TEXT": segment_text,
    });
    Ok(serde_json::to_string_pretty(&payload)?)
}

/// Input of one verification pass over a cluster
pub fn verification_payload(
    cluster: &CandidateCluster,
    contexts: &[String],
    pass: usize,
) -> Result<String, PipelineError> {
    let payload = json!({
        "CLUSTER": cluster.id.to_string(),
        "PASS": pass,
        "MENTIONS": cluster.surfaces,
        "PROPOSED_LABELS": cluster.proposed_labels,
        "CONTEXTS": contexts,
    });
    Ok(serde_json::to_string_pretty(&payload)?)
}
