//! The fixed validator catalog.

use serde::{Deserialize, Serialize};

/// Domain tags for validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    Product,
    Architecture,
    Security,
    Data,
    Quality,
    Experience,
    Operations,
    Compliance,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Product => "product",
            Domain::Architecture => "architecture",
            Domain::Security => "security",
            Domain::Data => "data",
            Domain::Quality => "quality",
            Domain::Experience => "experience",
            Domain::Operations => "operations",
            Domain::Compliance => "compliance",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validator in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidatorSpec {
    /// Stable id, used in reports and failure lists
    pub id: &'static str,

    /// Domain tag
    pub domain: Domain,

    /// Template reference resolved by the template store
    pub template: &'static str,

    /// Always selected, regardless of signals
    pub universal: bool,

    /// Lowercase words that select this validator
    #[serde(skip)]
    pub keywords: &'static [&'static str],
}

/// All validators, in padding priority order.
pub const CATALOG: &[ValidatorSpec] = &[
    ValidatorSpec {
        id: "scope-clarity",
        domain: Domain::Product,
        template: "validators/scope-clarity",
        universal: true,
        keywords: &[],
    },
    ValidatorSpec {
        id: "acceptance-criteria",
        domain: Domain::Quality,
        template: "validators/acceptance-criteria",
        universal: true,
        keywords: &[],
    },
    ValidatorSpec {
        id: "solution-architecture",
        domain: Domain::Architecture,
        template: "validators/solution-architecture",
        universal: true,
        keywords: &[],
    },
    ValidatorSpec {
        id: "test-strategy",
        domain: Domain::Quality,
        template: "validators/test-strategy",
        universal: false,
        keywords: &["test", "tests", "testing", "qa", "regression", "coverage"],
    },
    ValidatorSpec {
        id: "security",
        domain: Domain::Security,
        template: "validators/security",
        universal: false,
        keywords: &[
            "auth", "authentication", "authorization", "login", "password", "token", "oauth",
            "encryption", "secret", "permissions", "security",
        ],
    },
    ValidatorSpec {
        id: "data-model",
        domain: Domain::Data,
        template: "validators/data-model",
        universal: false,
        keywords: &[
            "database", "schema", "migration", "sql", "table", "entity", "storage", "records",
            "data",
        ],
    },
    ValidatorSpec {
        id: "api-design",
        domain: Domain::Architecture,
        template: "validators/api-design",
        universal: false,
        keywords: &["api", "endpoint", "rest", "graphql", "webhook", "integration", "sdk"],
    },
    ValidatorSpec {
        id: "user-experience",
        domain: Domain::Experience,
        template: "validators/user-experience",
        universal: false,
        keywords: &[
            "ui", "ux", "screen", "page", "form", "mobile", "frontend", "dashboard", "onboarding",
        ],
    },
    ValidatorSpec {
        id: "accessibility",
        domain: Domain::Experience,
        template: "validators/accessibility",
        universal: false,
        keywords: &["accessibility", "a11y", "wcag", "screen-reader", "contrast", "keyboard"],
    },
    ValidatorSpec {
        id: "performance",
        domain: Domain::Operations,
        template: "validators/performance",
        universal: false,
        keywords: &["performance", "latency", "scale", "scalability", "cache", "throughput", "load"],
    },
    ValidatorSpec {
        id: "devops",
        domain: Domain::Operations,
        template: "validators/devops",
        universal: false,
        keywords: &[
            "deploy", "deployment", "pipeline", "ci", "cd", "infrastructure", "docker",
            "kubernetes", "monitoring",
        ],
    },
    ValidatorSpec {
        id: "compliance",
        domain: Domain::Compliance,
        template: "validators/compliance",
        universal: false,
        keywords: &[
            "gdpr", "hipaa", "pci", "compliance", "audit", "privacy", "consent", "regulatory",
            "payments", "payment",
        ],
    },
];

impl ValidatorSpec {
    /// Validation-type key shared by every validator of this kind:
    /// `"universal"` or `"domain"`.
    pub fn class(&self) -> &'static str {
        if self.universal {
            "universal"
        } else {
            "domain"
        }
    }
}

/// Look up a validator by id.
pub fn find(id: &str) -> Option<&'static ValidatorSpec> {
    CATALOG.iter().find(|v| v.id == id)
}
