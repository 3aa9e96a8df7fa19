//! The five backend agents a request can be routed to.
//!
//! Each [`Target`] carries fixed metadata ([`TargetInfo`]) compiled into
//! the binary. Only the base URL is configurable; see
//! [`crate::config::TargetsConfig`].
//!
//! | Target | Display name | Default base URL |
//! |--------|--------------|------------------|
//! | `collector` | Data Collector | `http://localhost:5000` |
//! | `knowledge` | Knowledge Base | `http://localhost:5001` |
//! | `database` | Database Manager | `http://localhost:5002` |
//! | `transformer` | Data Transformer | `http://localhost:5003` |
//! | `orchestrator` | Orchestrator | `http://localhost:5004` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A backend agent role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Collector,
    Knowledge,
    Database,
    Transformer,
    Orchestrator,
}

/// Static attributes of a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Human-readable name used in agent messages.
    pub display_name: &'static str,
    /// Short category tag shown next to agent messages.
    pub tag: &'static str,
    /// Base URL used when the configuration does not override it.
    pub default_url: &'static str,
    /// One-line description of what the agent does.
    pub description: &'static str,
    /// Path probed by `acon status`.
    pub health_path: &'static str,
}

impl Target {
    /// All targets, in routing priority order.
    pub const ALL: [Target; 5] = [
        Target::Collector,
        Target::Knowledge,
        Target::Database,
        Target::Transformer,
        Target::Orchestrator,
    ];

    /// Lowercase identifier (`"collector"`, `"knowledge"`, ...).
    pub fn id(self) -> &'static str {
        match self {
            Target::Collector => "collector",
            Target::Knowledge => "knowledge",
            Target::Database => "database",
            Target::Transformer => "transformer",
            Target::Orchestrator => "orchestrator",
        }
    }

    pub fn info(self) -> &'static TargetInfo {
        match self {
            Target::Collector => &COLLECTOR,
            Target::Knowledge => &KNOWLEDGE,
            Target::Database => &DATABASE,
            Target::Transformer => &TRANSFORMER,
            Target::Orchestrator => &ORCHESTRATOR,
        }
    }

    pub fn display_name(self) -> &'static str {
        self.info().display_name
    }
}

const COLLECTOR: TargetInfo = TargetInfo {
    display_name: "Data Collector",
    tag: "[scrape]",
    default_url: "http://localhost:5000",
    description: "Web scraping and file uploads",
    health_path: "/api/health",
};

const KNOWLEDGE: TargetInfo = TargetInfo {
    display_name: "Knowledge Base",
    tag: "[docs]",
    default_url: "http://localhost:5001",
    description: "Document processing and semantic search",
    health_path: "/api/knowledge/health",
};

const DATABASE: TargetInfo = TargetInfo {
    display_name: "Database Manager",
    tag: "[data]",
    default_url: "http://localhost:5002",
    description: "Storage, backups and analytics",
    health_path: "/api/database/health",
};

const TRANSFORMER: TargetInfo = TargetInfo {
    display_name: "Data Transformer",
    tag: "[xform]",
    default_url: "http://localhost:5003",
    description: "Template mapping between marketplace formats",
    health_path: "/api/transformer/health",
};

const ORCHESTRATOR: TargetInfo = TargetInfo {
    display_name: "Orchestrator",
    tag: "[orch]",
    default_url: "http://localhost:5004",
    description: "Workflow coordination across agents",
    health_path: "/api/orchestrator/status",
};

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Target::ALL
            .into_iter()
            .find(|t| t.id() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown target '{}'. Must be one of: collector, knowledge, database, transformer, orchestrator",
                    s
                )
            })
    }
}
