//! The validated payslip record.
//!
//! Field names serialise in camelCase so an exported record reads exactly like
//! the JSON the model was asked to produce. Records are only ever built by
//! [`crate::pipeline::validate::validate`] (or deserialised from a previous
//! export); there is no `Default`, because a missing figure is a defect, never
//! a zero.

use serde::{Deserialize, Serialize};

/// One identified payroll line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionLine {
    pub name: String,
    pub amount: f64,
}

/// A named group of contribution lines with its self-reported total.
///
/// `total` should equal the sum of `lines[].amount`; the reconciler reports
/// when it does not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionCategory {
    pub total: f64,
    pub lines: Vec<ContributionLine>,
}

impl ContributionCategory {
    /// A present-but-empty category.
    pub fn empty() -> Self {
        Self {
            total: 0.0,
            lines: Vec::new(),
        }
    }

    /// Sum of the line amounts.
    pub fn lines_sum(&self) -> f64 {
        self.lines.iter().map(|l| l.amount).sum()
    }
}

/// Employer-side charges ("Charges patronales" column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployerContributions {
    pub total: f64,
    pub health: ContributionCategory,
    pub retirement: ContributionCategory,
    pub family: ContributionCategory,
    pub unemployment: ContributionCategory,
    pub cse: ContributionCategory,
    pub other: ContributionCategory,
}

impl EmployerContributions {
    /// `(wire name, category)` pairs in contract order.
    pub fn categories(&self) -> [(&'static str, &ContributionCategory); 6] {
        [
            ("health", &self.health),
            ("retirement", &self.retirement),
            ("family", &self.family),
            ("unemployment", &self.unemployment),
            ("cse", &self.cse),
            ("other", &self.other),
        ]
    }
}

/// Employee-side deductions ("A déduire" column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeContributions {
    pub total: f64,
    pub health: ContributionCategory,
    pub retirement: ContributionCategory,
    pub unemployment: ContributionCategory,
    pub csg_crds: ContributionCategory,
    pub other: ContributionCategory,
}

impl EmployeeContributions {
    /// `(wire name, category)` pairs in contract order.
    pub fn categories(&self) -> [(&'static str, &ContributionCategory); 5] {
        [
            ("health", &self.health),
            ("retirement", &self.retirement),
            ("unemployment", &self.unemployment),
            ("csgCrds", &self.csg_crds),
            ("other", &self.other),
        ]
    }
}

/// Income tax withheld at source (PAS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithholdingTax {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
}

/// A fully validated payslip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayslipRecord {
    pub employee_name: String,
    pub period: String,
    pub gross_salary: f64,
    pub net_salary_before_tax: f64,
    pub net_salary_after_tax: f64,
    pub employer_contributions: EmployerContributions,
    pub employee_contributions: EmployeeContributions,
    /// As reported by the model. Never used as a denominator; see
    /// [`crate::reconcile`].
    pub super_gross: f64,
    pub withholding_tax: WithholdingTax,
}
