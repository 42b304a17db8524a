//! Request construction: normalised image + output contract → [`ExtractionRequest`].
//!
//! The request is a plain value. It carries everything a backend needs to
//! call a model (instruction text, image, and a machine-checkable contract)
//! and nothing else: no client, no credentials. Backends decide how to
//! transmit it; the strict backend turns the contract into a forced
//! function-call schema, the free-text backend relies on the contract
//! rendered inside the instructions.

use crate::pipeline::encode::NormalizedImage;
use crate::prompts::{render_instructions, DEFAULT_INSTRUCTIONS};
use serde_json::{json, Map, Value};

/// Employer-side categories, in contract order.
pub const EMPLOYER_CATEGORIES: &[&str] = &[
    "health",
    "retirement",
    "family",
    "unemployment",
    "cse",
    "other",
];

/// Employee-side categories, in contract order.
pub const EMPLOYEE_CATEGORIES: &[&str] = &["health", "retirement", "unemployment", "csgCrds", "other"];

/// Name of the function the strict backend forces the model to call.
pub const TOOL_NAME: &str = "submit_payslip";

/// Primitive kind expected for a top-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    EmployerSide,
    EmployeeSide,
    Withholding,
}

/// The required shape of the model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputContract {
    /// Required top-level fields with their kind and a hint for the model.
    pub fields: Vec<(&'static str, FieldKind, &'static str)>,
    pub employer_categories: &'static [&'static str],
    pub employee_categories: &'static [&'static str],
}

impl Default for OutputContract {
    fn default() -> Self {
        Self::payslip()
    }
}

impl OutputContract {
    /// The French payslip contract.
    pub fn payslip() -> Self {
        Self {
            fields: vec![
                ("employeeName", FieldKind::Text, "Nom et prénom de l'employé"),
                ("period", FieldKind::Text, "Mois et année (format: janvier 2024)"),
                ("grossSalary", FieldKind::Number, "Salaire brut"),
                (
                    "netSalaryBeforeTax",
                    FieldKind::Number,
                    "Net à payer avant impôt sur le revenu",
                ),
                ("netSalaryAfterTax", FieldKind::Number, "Net payé"),
                (
                    "employerContributions",
                    FieldKind::EmployerSide,
                    "Charges patronales",
                ),
                (
                    "employeeContributions",
                    FieldKind::EmployeeSide,
                    "Cotisations salariales (A déduire)",
                ),
                (
                    "superGross",
                    FieldKind::Number,
                    "grossSalary + employerContributions.total",
                ),
                (
                    "withholdingTax",
                    FieldKind::Withholding,
                    "Impôt sur le revenu prélevé à la source",
                ),
            ],
            employer_categories: EMPLOYER_CATEGORIES,
            employee_categories: EMPLOYEE_CATEGORIES,
        }
    }

    /// Names of the required top-level fields.
    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(name, _, _)| *name).collect()
    }

    /// An annotated example object, embedded in the instructions.
    pub fn skeleton(&self) -> Value {
        let category = json!({
            "total": 0,
            "lines": [{ "name": "nom exact de la ligne", "amount": 0 }]
        });
        let side = |cats: &[&str]| {
            let mut obj = Map::new();
            obj.insert("total".into(), json!(0));
            for c in cats {
                obj.insert((*c).into(), category.clone());
            }
            Value::Object(obj)
        };

        let mut root = Map::new();
        for (name, kind, hint) in &self.fields {
            let v = match kind {
                FieldKind::Text => json!(hint),
                FieldKind::Number => json!(0),
                FieldKind::EmployerSide => side(self.employer_categories),
                FieldKind::EmployeeSide => side(self.employee_categories),
                FieldKind::Withholding => json!({
                    "amount": 0,
                    "line": "Impôt sur le revenu prélevé à la source - PAS",
                    "rate": "taux appliqué en pourcentage"
                }),
            };
            root.insert((*name).into(), v);
        }
        Value::Object(root)
    }

    /// JSON Schema for the function-call channel.
    pub fn json_schema(&self) -> Value {
        let category = json!({
            "type": "object",
            "required": ["total", "lines"],
            "properties": {
                "total": { "type": "number" },
                "lines": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["name", "amount"],
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "amount": { "type": "number" }
                        }
                    }
                }
            }
        });
        let side = |cats: &[&str], description: &str| {
            let mut props = Map::new();
            props.insert("total".into(), json!({ "type": "number" }));
            for c in cats {
                props.insert((*c).into(), category.clone());
            }
            let mut required = vec!["total".to_string()];
            required.extend(cats.iter().map(|c| c.to_string()));
            json!({
                "type": "object",
                "description": description,
                "required": required,
                "properties": props
            })
        };

        let mut props = Map::new();
        for (name, kind, hint) in &self.fields {
            let schema = match kind {
                FieldKind::Text => json!({ "type": "string", "description": hint }),
                FieldKind::Number => json!({ "type": "number", "description": hint }),
                FieldKind::EmployerSide => side(self.employer_categories, hint),
                FieldKind::EmployeeSide => side(self.employee_categories, hint),
                FieldKind::Withholding => json!({
                    "type": "object",
                    "description": hint,
                    "required": ["amount"],
                    "properties": {
                        "amount": { "type": "number" },
                        "line": { "type": "string" },
                        "rate": { "type": "string" }
                    }
                }),
            };
            props.insert((*name).into(), schema);
        }

        json!({
            "type": "object",
            "required": self.required_fields(),
            "properties": props
        })
    }
}

/// One self-contained request for the upstream model.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Full instruction text, contract included.
    pub instructions: String,
    pub image: NormalizedImage,
    pub contract: OutputContract,
}

impl ExtractionRequest {
    /// The function definition used by the strict backend.
    pub fn tool_definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": TOOL_NAME,
                "description": "Return the payslip extracted from the image.",
                "parameters": self.contract.json_schema()
            }
        })
    }
}

/// Builds [`ExtractionRequest`]s from a fixed instruction template.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequestBuilder<'a> {
    template: &'a str,
}

impl Default for ExtractionRequestBuilder<'static> {
    fn default() -> Self {
        Self {
            template: DEFAULT_INSTRUCTIONS,
        }
    }
}

impl<'a> ExtractionRequestBuilder<'a> {
    /// Use a custom template; `None` selects the built-in one.
    pub fn new(template: Option<&'a str>) -> Self {
        Self {
            template: template.unwrap_or(DEFAULT_INSTRUCTIONS),
        }
    }

    /// Pure: the same image and contract always yield the same request.
    pub fn build(&self, image: NormalizedImage, contract: OutputContract) -> ExtractionRequest {
        debug_assert!(!contract.fields.is_empty(), "empty output contract");
        let skeleton = contract.skeleton();
        let contract_text =
            serde_json::to_string_pretty(&skeleton).unwrap_or_else(|_| skeleton.to_string());
        ExtractionRequest {
            instructions: render_instructions(self.template, &contract_text),
            image,
            contract,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_image;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn tiny_image() -> NormalizedImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        encode_image(&img).unwrap()
    }

    #[test]
    fn build_is_deterministic() {
        let builder = ExtractionRequestBuilder::default();
        let a = builder.build(tiny_image(), OutputContract::payslip());
        let b = builder.build(tiny_image(), OutputContract::payslip());
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn instructions_embed_every_category() {
        let req = ExtractionRequestBuilder::default().build(tiny_image(), OutputContract::payslip());
        assert!(!req.instructions.contains("{contract}"));
        for field in OutputContract::payslip().required_fields() {
            assert!(req.instructions.contains(field), "missing {field}");
        }
        assert!(req.instructions.contains("csgCrds"));
        assert!(req.instructions.contains("cse"));
    }

    #[test]
    fn schema_requires_all_categories() {
        let schema = OutputContract::payslip().json_schema();
        let employer_required = schema["properties"]["employerContributions"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(employer_required.len(), 1 + EMPLOYER_CATEGORIES.len());
        let employee_required = schema["properties"]["employeeContributions"]["required"]
            .as_array()
            .unwrap();
        assert!(employee_required.contains(&json!("csgCrds")));
        assert_eq!(schema["required"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn tool_definition_names_the_function() {
        let req = ExtractionRequestBuilder::default().build(tiny_image(), OutputContract::payslip());
        let tool = req.tool_definition();
        assert_eq!(tool["function"]["name"], TOOL_NAME);
        assert_eq!(tool["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn custom_template_without_placeholder() {
        let req = ExtractionRequestBuilder::new(Some("Lis la fiche."))
            .build(tiny_image(), OutputContract::payslip());
        assert!(req.instructions.starts_with("Lis la fiche."));
        assert!(req.instructions.contains("employerContributions"));
    }
}
