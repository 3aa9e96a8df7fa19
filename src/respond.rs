//! Human-readable agent replies.
//!
//! Each target has its own formatting function, looked up through
//! [`formatter_for`]. The functions choose between canned reply blocks using
//! simple keyword checks on the lowercased original message; the backend
//! payload is accepted so that a richer renderer can replace any entry
//! without changing the call sites.

use serde_json::Value;

use crate::target::Target;

/// Signature shared by all per-target formatters. `message` is expected
/// to be lowercased already; [`format`] takes care of that.
pub type Formatter = fn(message: &str, payload: &Value) -> String;

/// Look up the formatter for `target`.
pub fn formatter_for(target: Target) -> Formatter {
    match target {
        Target::Collector => format_collector,
        Target::Knowledge => format_knowledge,
        Target::Database => format_database,
        Target::Transformer => format_transformer,
        Target::Orchestrator => format_orchestrator,
    }
}

/// Produce the reply text for a successful dispatch.
pub fn format(target: Target, message: &str, payload: &Value) -> String {
    formatter_for(target)(&message.to_lowercase(), payload)
}

fn format_collector(_message: &str, _payload: &Value) -> String {
    "The Data Collector is online and ready. Attach a file or give me a URL \
     and I will collect and extract its contents."
        .to_string()
}

fn format_knowledge(message: &str, _payload: &Value) -> String {
    if message.contains("last") && message.contains("document") {
        return "Here are the most recent documents added to the knowledge base:\n\
                1. Vendor Onboarding Guide (added 2 days ago)\n\
                2. Q3 Product Catalog Update (added 4 days ago)\n\
                3. Returns Policy Revision (added 1 week ago)"
            .to_string();
    }

    if message.contains("process") || message.contains("how to") {
        return "Here is the documented procedure:\n\
                1. Gather the source data and confirm the target marketplace.\n\
                2. Upload the files through the Data Collector.\n\
                3. Review the extracted fields in the knowledge base.\n\
                4. Apply the matching transformation template.\n\
                5. Validate the output before publishing."
            .to_string();
    }

    "I searched the knowledge base for your question. Relevant documents \
     were retrieved and are available for review."
        .to_string()
}

fn format_database(message: &str, _payload: &Value) -> String {
    if message.contains("how many") && message.contains("laptop") {
        return "Laptop sales summary:\n\
                - Units sold: 127\n\
                - Revenue: $98,450\n\
                - Top model: UltraBook Pro 14 (43 units)\n\
                - Change vs previous period: +12%"
            .to_string();
    }

    "Analytics are available from the Database Manager. Ask about sales, \
     counts or backups for a detailed report."
        .to_string()
}

fn format_transformer(_message: &str, _payload: &Value) -> String {
    "The Data Transformer is ready. Templates for BestBuy and Walmart are \
     loaded and field mappings can be generated on request."
        .to_string()
}

fn format_orchestrator(_message: &str, _payload: &Value) -> String {
    "All agents are operational. I can route scraping, knowledge search, \
     analytics and transformation requests for you."
        .to_string()
}
