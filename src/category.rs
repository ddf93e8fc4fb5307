//! Category normalization
//!
//! Maps free-text department and role labels onto the fixed set of
//! [`MacroCategory`] values using an ordered keyword rule table.
//! - Matching is case and accent insensitive
//! - The first rule with a matching keyword wins
//! - Unmatched non-empty labels fall back to the table's default category
//! - Empty or missing labels map to [`MacroCategory::Unspecified`]

use crate::error::AnalyticsError;
use crate::types::MacroCategory;
use serde::{Deserialize, Serialize};

/// A keyword and how it is matched against a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    /// Matches anywhere in the label (`"ingenier"` matches `"Ingeniera Civil"`)
    Substring(String),
    /// Matches whole words only (`"hr"` matches `"HR Analyst"` but not `"Three"`)
    Word(String),
}

impl Keyword {
    fn text(&self) -> &str {
        match self {
            Keyword::Substring(text) | Keyword::Word(text) => text,
        }
    }
}

/// Keywords that send a label to one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: MacroCategory,
    pub keywords: Vec<Keyword>,
}

impl CategoryRule {
    fn new(category: MacroCategory, substrings: &[&str], words: &[&str]) -> Self {
        let keywords = substrings
            .iter()
            .map(|s| Keyword::Substring((*s).to_string()))
            .chain(words.iter().map(|w| Keyword::Word((*w).to_string())))
            .collect();
        Self { category, keywords }
    }
}

/// Ordered rule table plus the fallback for unmatched labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRuleTable {
    pub rules: Vec<CategoryRule>,
    pub default_category: MacroCategory,
}

impl Default for CategoryRuleTable {
    fn default() -> Self {
        use MacroCategory::*;

        // Order matters: safety and quality titles often mention a manager or
        // an operation, and managers are grouped before their departments.
        let rules = vec![
            CategoryRule::new(
                SafetyHealthEnvironment,
                &[
                    "seguridad",
                    "safety",
                    "salud ocupacional",
                    "occupational health",
                    "ambient",
                    "environment",
                    "prevencion",
                ],
                &["hse", "hseq", "sso", "ehs", "sst"],
            ),
            CategoryRule::new(
                QualityControl,
                &[
                    "calidad",
                    "quality",
                    "inspecci",
                    "inspector",
                    "laboratori",
                    "metrolog",
                    "audit",
                ],
                &["qa", "qc"],
            ),
            CategoryRule::new(
                Management,
                &[
                    "gerente",
                    "gerencia",
                    "director",
                    "manager",
                    "jefe",
                    "jefatura",
                    "superintend",
                    "supervisor",
                ],
                &["ceo", "coo", "cfo", "head"],
            ),
            CategoryRule::new(
                EngineeringProjects,
                &[
                    "ingenier",
                    "engineer",
                    "proyecto",
                    "project",
                    "disen",
                    "design",
                    "desarrollo",
                    "planificaci",
                    "planning",
                ],
                &[],
            ),
            CategoryRule::new(
                OperationsMaintenance,
                &[
                    "operador",
                    "operari",
                    "operaci",
                    "operation",
                    "operator",
                    "produc",
                    "mantenimiento",
                    "maintenance",
                    "mecanic",
                    "mechanic",
                    "electric",
                    "tecnic",
                    "technician",
                    "planta",
                    "plant",
                    "linea",
                    "ensambl",
                    "assembly",
                    "soldad",
                    "welder",
                    "montaje",
                ],
                &[],
            ),
            CategoryRule::new(
                LogisticsSupply,
                &[
                    "logistic",
                    "almacen",
                    "warehouse",
                    "bodega",
                    "transport",
                    "conductor",
                    "driver",
                    "despacho",
                    "dispatch",
                    "compras",
                    "purchas",
                    "procurement",
                    "abastecimiento",
                    "supply",
                    "inventar",
                    "montacarg",
                    "forklift",
                ],
                &[],
            ),
            CategoryRule::new(
                AdministrationHr,
                &[
                    "administra",
                    "recursos humanos",
                    "human resources",
                    "talento humano",
                    "finanz",
                    "financ",
                    "contab",
                    "account",
                    "tesorer",
                    "nomina",
                    "payroll",
                    "secretar",
                    "recepci",
                    "legal",
                    "juridic",
                ],
                &["rrhh", "hr"],
            ),
            CategoryRule::new(
                ServicesSupport,
                &[
                    "servicio",
                    "service",
                    "soporte",
                    "support",
                    "limpieza",
                    "cleaning",
                    "aseo",
                    "cocina",
                    "kitchen",
                    "casino",
                    "cafeter",
                    "vigilan",
                    "guard",
                    "sistemas",
                    "informatic",
                ],
                &["it", "ti", "tic"],
            ),
        ];

        Self {
            rules,
            default_category: OperationsMaintenance,
        }
    }
}

impl CategoryRuleTable {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.default_category == MacroCategory::Unspecified {
            return Err(AnalyticsError::InvalidConfig(
                "default category cannot be Unspecified".to_string(),
            ));
        }

        for rule in &self.rules {
            if rule.category == MacroCategory::Unspecified {
                return Err(AnalyticsError::InvalidConfig(
                    "category rules cannot target Unspecified".to_string(),
                ));
            }
            if rule.keywords.iter().any(|k| fold_label(k.text()).is_empty()) {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "blank keyword in rule for {}",
                    rule.category
                )));
            }
        }

        Ok(())
    }
}

/// Keyword folded once at construction
#[derive(Debug, Clone)]
enum FoldedKeyword {
    Substring(String),
    /// Padded with spaces so it only matches on word boundaries
    Word(String),
}

/// Normalizer for mapping organizational labels to macro-categories
#[derive(Debug, Clone)]
pub struct CategoryNormalizer {
    rules: Vec<(MacroCategory, Vec<FoldedKeyword>)>,
    default_category: MacroCategory,
}

impl Default for CategoryNormalizer {
    fn default() -> Self {
        Self::new(&CategoryRuleTable::default())
    }
}

impl CategoryNormalizer {
    /// Build a normalizer from a rule table
    pub fn new(table: &CategoryRuleTable) -> Self {
        let rules = table
            .rules
            .iter()
            .map(|rule| {
                let keywords = rule
                    .keywords
                    .iter()
                    .map(|keyword| match keyword {
                        Keyword::Substring(text) => FoldedKeyword::Substring(fold_label(text)),
                        Keyword::Word(text) => {
                            FoldedKeyword::Word(format!(" {} ", fold_label(text)))
                        }
                    })
                    .collect();
                (rule.category, keywords)
            })
            .collect();

        Self {
            rules,
            default_category: table.default_category,
        }
    }

    /// Normalize a label. Total: never fails, never returns an unknown bucket.
    pub fn normalize(&self, label: Option<&str>) -> MacroCategory {
        let folded = match label.map(fold_label) {
            Some(folded) if !folded.is_empty() => folded,
            _ => return MacroCategory::Unspecified,
        };
        let padded = format!(" {folded} ");

        self.rules
            .iter()
            .find(|(_, keywords)| {
                keywords.iter().any(|keyword| match keyword {
                    FoldedKeyword::Substring(text) => {
                        !text.is_empty() && folded.contains(text.as_str())
                    }
                    FoldedKeyword::Word(text) => {
                        !text.trim().is_empty() && padded.contains(text.as_str())
                    }
                })
            })
            .map(|(category, _)| *category)
            .unwrap_or(self.default_category)
    }
}

/// Lowercase, strip Latin diacritics and collapse non-alphanumerics to single spaces
fn fold_label(label: &str) -> String {
    let mapped: String = label
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}
