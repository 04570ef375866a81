//! Static catalogue of pipeline stages.
//!
//! The ordinal of a stage is its position in the catalogue and is the index
//! used by every other part of the crate. Identifiers the remote job emits
//! that are not listed here are ignored by the reducer.

use serde::Serialize;

/// Identifier of the meta-event describing the run as a whole.
pub const PIPELINE_STEP_ID: &str = "pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepMeta {
    pub id: &'static str,
    pub ordinal: usize,
    pub label: &'static str,
    pub subtitle: &'static str,
}

pub const PIPELINE_STEPS: &[StepMeta] = &[
    StepMeta {
        id: "input",
        ordinal: 0,
        label: "Input Repositories",
        subtitle: "Repository URLs submitted for this run",
    },
    StepMeta {
        id: "clone",
        ordinal: 1,
        label: "Clone Repositories",
        subtitle: "Create a sandbox and clone every repository into it",
    },
    StepMeta {
        id: "deploy-sandbox",
        ordinal: 2,
        label: "Deploy Sandbox",
        subtitle: "Provision the sandbox compute environment",
    },
    StepMeta {
        id: "extract",
        ordinal: 3,
        label: "Extract Specs",
        subtitle: "Find OpenAPI and Swagger documents in the cloned sources",
    },
    StepMeta {
        id: "ingest",
        ordinal: 4,
        label: "Ingest Specs",
        subtitle: "Parse each specification into endpoints",
    },
    StepMeta {
        id: "discover",
        ordinal: 5,
        label: "Discover Tools",
        subtitle: "Mine callable capabilities from the endpoints",
    },
    StepMeta {
        id: "schema",
        ordinal: 6,
        label: "Synthesize Schemas",
        subtitle: "Build typed JSON schemas for every tool",
    },
    StepMeta {
        id: "policy",
        ordinal: 7,
        label: "Apply Policies",
        subtitle: "Classify tool safety and execution policy",
    },
    StepMeta {
        id: "generate",
        ordinal: 8,
        label: "Generate Servers",
        subtitle: "Generate MCP server code for each service",
    },
    StepMeta {
        id: "mcp-test",
        ordinal: 9,
        label: "Validate Servers",
        subtitle: "Check generated files and syntax",
    },
    StepMeta {
        id: "deploy",
        ordinal: 10,
        label: "Deploy Services",
        subtitle: "Deploy upstream APIs and MCP servers",
    },
    StepMeta {
        id: "user-test",
        ordinal: 11,
        label: "End-User Testing",
        subtitle: "Exercise the deployed tools as an end user would",
    },
];

/// Read-only view over an ordered step catalogue.
#[derive(Debug, Clone, Copy)]
pub struct StepRegistry {
    steps: &'static [StepMeta],
}

impl StepRegistry {
    /// Wraps a catalogue whose entries are listed in ordinal order.
    ///
    /// The catalogue must not be empty.
    pub const fn new(steps: &'static [StepMeta]) -> Self {
        Self { steps }
    }

    /// The built-in pipeline catalogue.
    pub const fn pipeline() -> Self {
        Self::new(PIPELINE_STEPS)
    }

    pub fn lookup(&self, ordinal: usize) -> Option<&StepMeta> {
        self.steps.get(ordinal)
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps
            .iter()
            .find(|step| step.id == step_id)
            .map(|step| step.ordinal)
    }

    pub fn max_ordinal(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepMeta> {
        self.steps.iter()
    }

    /// Clamps an arbitrary requested position into `[0, max_ordinal]`.
    pub fn clamp(&self, ordinal: i64) -> usize {
        ordinal.clamp(0, self.max_ordinal() as i64) as usize
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::pipeline()
    }
}
