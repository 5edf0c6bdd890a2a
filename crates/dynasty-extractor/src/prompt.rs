//! Extraction prompts

/// Default system prompt for relation extraction
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Your role is to inspect the contents of a politician's encyclopedia page and extract \
information about any family members who were either a member of parliament, a local \
councillor, or otherwise a politician.

Rules:
- Only include relatives who themselves held or stood for political office.
- Never include the politician the page is about.
- relation_kind is the relative's relationship TO the politician:
  parent = mother or father; grandparent = any grandparent or great-grandparent;
  aunt_or_uncle = aunt, uncle, great-aunt or great-uncle; other_ancestor = any other \
blood ancestor; sibling = brother or sister; spouse = husband, wife or civil partner; \
other = anyone else (cousins, children, in-laws).
- description briefly states the evidence from the page, or null.
- role is the relative's political role, or null. party is their party, or null.
- If no relative qualifies, return an empty relations list.";

/// Build the user message for one subject
pub fn build_user_prompt(subject_name: &str, biography_text: &str) -> String {
    format!(
        "Politician: {subject_name}\n\n\
         Relatives of {subject_name} only; do not list {subject_name} themselves.\n\n\
         Page text:\n{biography_text}"
    )
}
