use chrono::{DateTime, Utc};

use crate::auth::CurrentUser;
use crate::models::chat::SearchMode;

/// Compose the system prompt: user/time base block, the mode-specific tool
/// rules, and the common answering rules.
pub fn build_system_prompt(user: &CurrentUser, mode: SearchMode, now: DateTime<Utc>) -> String {
    let mut prompt = format!(
        "You are a knowledge assistant answering questions for {} ({}).\n\
         Current time (UTC): {}.\n\n",
        user.name,
        user.email,
        now.format("%Y-%m-%dT%H:%M:%SZ")
    );

    match mode {
        SearchMode::Rag => prompt.push_str(
            "Available tools:\n\
             - knowledge_search: semantic search over the indexed knowledge base.\n\
             - get_current_site: details of the site this conversation is scoped to.\n\
             - get_current_user: profile of the person you are assisting.\n\
             - read_file_content: full text of a single document by its URL.\n\n\
             Rules for knowledge_search: pass the user's question verbatim as the \
             query. Do not augment, rephrase, or add context to it.\n\n",
        ),
        SearchMode::Kql => prompt.push_str(
            "Available tools:\n\
             - sharepoint_search: keyword search over the document platform.\n\
             - get_current_site: details of the site this conversation is scoped to.\n\
             - get_current_user: profile of the person you are assisting.\n\
             - read_file_content: full text of a single document by its URL.\n\n\
             Rules for sharepoint_search: pass only 1-3 topic keywords. Never \
             include user-specific context such as names or emails in the query.\n\n",
        ),
    }

    prompt.push_str(
        "When answering:\n\
         - Prefer hedged phrasing such as \"it appears that\" when the sources \
         are not definitive.\n\
         - Include verbatim quotes from the sources that support your answer.\n\
         - Cite the webUrl of every source you used at the end of the answer.\n",
    );

    prompt
}
