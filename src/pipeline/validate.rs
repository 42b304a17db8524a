//! Contract check: recovered JSON object → [`PayslipRecord`].
//!
//! Fails fast on the first violation. Checks run in three passes so the
//! reported defect is always the shallowest one:
//!
//! 1. every top-level field is present with the right primitive kind;
//! 2. both contribution sides carry `total` and every required category,
//!    each with a numeric `total` and a `lines` array;
//! 3. every line has a non-blank `name` and a numeric `amount`.
//!
//! A category with no lines and a zero total is valid. A category that is
//! absent (or `null`) is a `missing` defect; nothing is ever defaulted.

use crate::error::{DefectReason, SchemaDefect};
use crate::pipeline::recover::RecoveredJson;
use crate::pipeline::request::{FieldKind, OutputContract, EMPLOYEE_CATEGORIES, EMPLOYER_CATEGORIES};
use crate::record::{
    ContributionCategory, ContributionLine, EmployeeContributions, EmployerContributions,
    PayslipRecord, WithholdingTax,
};
use serde_json::{Map, Value};

type Object = Map<String, Value>;

/// Salary figures that may never be negative.
const NON_NEGATIVE: &[&str] = &["grossSalary", "netSalaryBeforeTax", "netSalaryAfterTax"];

/// Validate a recovered object against the payslip contract.
pub fn validate(json: &RecoveredJson) -> Result<PayslipRecord, SchemaDefect> {
    validate_object(&json.value)
}

/// Validate any JSON value; a non-object root is a `wrong-type` defect at `$`.
pub fn validate_value(value: &Value) -> Result<PayslipRecord, SchemaDefect> {
    match value {
        Value::Object(root) => validate_object(root),
        other => Err(wrong_type("$", "object", other)),
    }
}

/// Validate a JSON object against the payslip contract.
pub fn validate_object(root: &Object) -> Result<PayslipRecord, SchemaDefect> {
    // Pass 1: top-level presence and kind.
    for (name, kind, _) in &OutputContract::payslip().fields {
        let value = field(root, name, name)?;
        match kind {
            FieldKind::Text => {
                string(value, name)?;
            }
            FieldKind::Number => {
                number(value, name)?;
            }
            FieldKind::EmployerSide | FieldKind::EmployeeSide | FieldKind::Withholding => {
                object(value, name)?;
            }
        }
    }
    for name in NON_NEGATIVE {
        non_negative(number(field(root, name, name)?, name)?, name)?;
    }
    let withholding_tax = withholding(object(field(root, "withholdingTax", "withholdingTax")?, "withholdingTax")?)?;

    // Pass 2: category shells.
    let employer = object(
        field(root, "employerContributions", "employerContributions")?,
        "employerContributions",
    )?;
    let employee = object(
        field(root, "employeeContributions", "employeeContributions")?,
        "employeeContributions",
    )?;
    check_side(employer, "employerContributions", EMPLOYER_CATEGORIES)?;
    check_side(employee, "employeeContributions", EMPLOYEE_CATEGORIES)?;

    // Pass 3: lines, building the record as we go.
    let cat = |side: &Object, side_path: &str, name: &str| {
        category(side, &format!("{side_path}.{name}"), name)
    };
    let employer_contributions = EmployerContributions {
        total: number(field(employer, "total", "employerContributions.total")?, "employerContributions.total")?,
        health: cat(employer, "employerContributions", "health")?,
        retirement: cat(employer, "employerContributions", "retirement")?,
        family: cat(employer, "employerContributions", "family")?,
        unemployment: cat(employer, "employerContributions", "unemployment")?,
        cse: cat(employer, "employerContributions", "cse")?,
        other: cat(employer, "employerContributions", "other")?,
    };
    let employee_contributions = EmployeeContributions {
        total: number(field(employee, "total", "employeeContributions.total")?, "employeeContributions.total")?,
        health: cat(employee, "employeeContributions", "health")?,
        retirement: cat(employee, "employeeContributions", "retirement")?,
        unemployment: cat(employee, "employeeContributions", "unemployment")?,
        csg_crds: cat(employee, "employeeContributions", "csgCrds")?,
        other: cat(employee, "employeeContributions", "other")?,
    };

    Ok(PayslipRecord {
        employee_name: string(field(root, "employeeName", "employeeName")?, "employeeName")?.to_string(),
        period: string(field(root, "period", "period")?, "period")?.to_string(),
        gross_salary: number(field(root, "grossSalary", "grossSalary")?, "grossSalary")?,
        net_salary_before_tax: number(field(root, "netSalaryBeforeTax", "netSalaryBeforeTax")?, "netSalaryBeforeTax")?,
        net_salary_after_tax: number(field(root, "netSalaryAfterTax", "netSalaryAfterTax")?, "netSalaryAfterTax")?,
        employer_contributions,
        employee_contributions,
        super_gross: number(field(root, "superGross", "superGross")?, "superGross")?,
        withholding_tax,
    })
}

fn check_side(side: &Object, path: &str, categories: &[&str]) -> Result<(), SchemaDefect> {
    let total_path = format!("{path}.total");
    number(field(side, "total", &total_path)?, &total_path)?;
    for name in categories {
        let cat_path = format!("{path}.{name}");
        let cat = object(field(side, name, &cat_path)?, &cat_path)?;
        let total_path = format!("{cat_path}.total");
        number(field(cat, "total", &total_path)?, &total_path)?;
        let lines_path = format!("{cat_path}.lines");
        array(field(cat, "lines", &lines_path)?, &lines_path)?;
    }
    Ok(())
}

fn category(side: &Object, path: &str, name: &str) -> Result<ContributionCategory, SchemaDefect> {
    let cat = object(field(side, name, path)?, path)?;
    let total_path = format!("{path}.total");
    let lines_path = format!("{path}.lines");
    let total = number(field(cat, "total", &total_path)?, &total_path)?;
    let raw_lines = array(field(cat, "lines", &lines_path)?, &lines_path)?;

    let mut lines = Vec::with_capacity(raw_lines.len());
    for (i, raw) in raw_lines.iter().enumerate() {
        let line_path = format!("{lines_path}[{i}]");
        let line = object(raw, &line_path)?;
        let name_path = format!("{line_path}.name");
        let name = string(field(line, "name", &name_path)?, &name_path)?;
        if name.trim().is_empty() {
            return Err(SchemaDefect::new(name_path, DefectReason::EmptyName));
        }
        let amount_path = format!("{line_path}.amount");
        let amount = number(field(line, "amount", &amount_path)?, &amount_path)?;
        lines.push(ContributionLine {
            name: name.to_string(),
            amount,
        });
    }
    Ok(ContributionCategory { total, lines })
}

fn withholding(obj: &Object) -> Result<WithholdingTax, SchemaDefect> {
    let amount = number(field(obj, "amount", "withholdingTax.amount")?, "withholdingTax.amount")?;
    non_negative(amount, "withholdingTax.amount")?;

    let line = match obj.get("line") {
        None | Some(Value::Null) => None,
        Some(v) => Some(string(v, "withholdingTax.line")?.to_string()),
    };
    let rate = match obj.get("rate") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => return Err(wrong_type("withholdingTax.rate", "string", other)),
    };
    Ok(WithholdingTax { amount, line, rate })
}

// ── Primitive accessors ──────────────────────────────────────────────────────

fn field<'a>(obj: &'a Object, key: &str, path: &str) -> Result<&'a Value, SchemaDefect> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(SchemaDefect::new(path, DefectReason::Missing)),
        Some(v) => Ok(v),
    }
}

fn number(value: &Value, path: &str) -> Result<f64, SchemaDefect> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| wrong_type(path, "number", value))
}

fn string<'a>(value: &'a Value, path: &str) -> Result<&'a str, SchemaDefect> {
    value.as_str().ok_or_else(|| wrong_type(path, "string", value))
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Object, SchemaDefect> {
    value.as_object().ok_or_else(|| wrong_type(path, "object", value))
}

fn array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, SchemaDefect> {
    value.as_array().ok_or_else(|| wrong_type(path, "array", value))
}

fn non_negative(n: f64, path: &str) -> Result<f64, SchemaDefect> {
    if n < 0.0 {
        Err(SchemaDefect::new(path, DefectReason::Negative))
    } else {
        Ok(n)
    }
}

fn wrong_type(path: &str, expected: &'static str, found: &Value) -> SchemaDefect {
    SchemaDefect::new(
        path,
        DefectReason::WrongType {
            expected,
            found: kind_of(found),
        },
    )
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
