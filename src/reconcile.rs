//! Financial reconciliation: [`PayslipRecord`] → [`ReconciledWaterfall`].
//!
//! `reconcile` is total. It never fails and never rewrites the record; it
//! derives a read-only view whose every percentage shares one denominator,
//! the superGross **recomputed** from leaf figures:
//!
//! ```text
//! superGross = grossSalary + employerContributions.total
//! ```
//!
//! The model's own `superGross` is kept for comparison only. Any self-reported
//! aggregate that disagrees with its recomputation by more than one cent is
//! listed in [`ReconciledWaterfall::discrepancies`] and logged at `warn`.
//!
//! When the recomputed superGross is zero every percentage is `NaN`; amounts
//! stay valid.

use crate::record::{ContributionCategory, PayslipRecord};
use serde::Serialize;
use tracing::{debug, warn};

/// Largest disagreement, in euros, tolerated between a reported aggregate and
/// its recomputation.
pub const TOLERANCE: f64 = 0.01;

/// Identity of a waterfall bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    NetPaid,
    Tax,
    EmployeeContributions,
    EmployerContributions,
    Retirement,
    Health,
    Unemployment,
    Family,
    CseAndOther,
    CsgCrds,
}

/// Which presentation to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Cascade,
    Detailed,
}

/// One slice of superGross.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallEntry {
    pub bucket: Bucket,
    pub label: &'static str,
    pub amount: f64,
    /// One decimal; `NaN` when superGross is zero.
    pub percentage_of_super_gross: f64,
}

/// Employee / employer split of a detailed entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShareSplit {
    pub employee: f64,
    pub employer: f64,
}

/// A detailed-view entry with its presentation text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedEntry {
    #[serde(flatten)]
    pub entry: WaterfallEntry,
    pub description: &'static str,
    /// `None` for net paid and tax.
    pub split: Option<ShareSplit>,
    /// Static per category; not read from the document.
    pub breakdown: &'static [&'static str],
}

/// A summary figure with its share of superGross.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineFigure {
    pub label: &'static str,
    pub amount: f64,
    pub percentage_of_super_gross: f64,
}

/// The four summary figures, superGross down to net paid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Headline {
    pub super_gross: HeadlineFigure,
    pub gross: HeadlineFigure,
    pub net_before_tax: HeadlineFigure,
    pub net_after_tax: HeadlineFigure,
}

impl Headline {
    pub fn figures(&self) -> [&HeadlineFigure; 4] {
        [
            &self.super_gross,
            &self.gross,
            &self.net_before_tax,
            &self.net_after_tax,
        ]
    }
}

/// A reported aggregate that does not match its recomputation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    /// Dotted path of the reported figure.
    pub path: String,
    pub reported: f64,
    pub computed: f64,
}

impl Discrepancy {
    pub fn gap(&self) -> f64 {
        self.reported - self.computed
    }
}

/// Derived, read-only view of one payslip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledWaterfall {
    /// Recomputed; the denominator of every percentage.
    pub super_gross: f64,
    /// As found on the record.
    pub reported_super_gross: f64,
    pub headline: Headline,
    pub cascade: Vec<WaterfallEntry>,
    pub detailed: Vec<DetailedEntry>,
    pub discrepancies: Vec<Discrepancy>,
}

const RETIREMENT_BREAKDOWN: &[&str] = &[
    "Sécurité Sociale plafonnée (retraite de base)",
    "Sécurité Sociale déplafonnée",
    "Complémentaire Tranche 1 (Agirc-Arrco)",
    "Complémentaire Tranche 2 (Agirc-Arrco)",
];

const HEALTH_BREAKDOWN: &[&str] = &[
    "Sécurité Sociale - Maladie, Maternité, Invalidité, Décès",
    "Complémentaire - Incapacité, Invalidité, Décès",
    "Complémentaire - Santé / Mutuelle",
    "Accidents du travail & maladies professionnelles (employeur)",
];

const UNEMPLOYMENT_BREAKDOWN: &[&str] = &["Assurance chômage (4,25% du salaire brut)"];

const FAMILY_BREAKDOWN: &[&str] = &["Cotisation uniquement patronale pour les allocations familiales"];

const CSE_OTHER_BREAKDOWN: &[&str] = &[
    "CSE - Comité Social et Économique (fonctionnement + activités sociales)",
    "Autres contributions dues par l'Employeur",
    "Formation professionnelle, versement mobilité",
    "Taxes et contributions diverses",
    "Titres restaurant / Cantine (part salarié)",
];

const CSG_CRDS_BREAKDOWN: &[&str] = &["CSG déductible des impôts", "CSG/CRDS non déductible"];

/// Derive the waterfall of a validated record.
pub fn reconcile(record: &PayslipRecord) -> ReconciledWaterfall {
    let employer = &record.employer_contributions;
    let employee = &record.employee_contributions;
    let super_gross = record.gross_salary + employer.total;
    let net = record.net_salary_after_tax;
    let tax = record.withholding_tax.amount;

    let pct = |amount: f64| percentage(amount, super_gross);
    let figure = |label, amount| HeadlineFigure {
        label,
        amount,
        percentage_of_super_gross: pct(amount),
    };

    let headline = Headline {
        super_gross: figure("Superbrut", super_gross),
        gross: figure("Salaire brut", record.gross_salary),
        net_before_tax: figure("Net avant impôt", record.net_salary_before_tax),
        net_after_tax: figure("Net payé", net),
    };

    let cascade_buckets = [
        (Bucket::NetPaid, "Net après impôts", net),
        (Bucket::Tax, "Impôts sur le revenu", tax),
        (Bucket::EmployeeContributions, "Cotisations sociales", employee.total),
        (Bucket::EmployerContributions, "Cotisations patronales", employer.total),
    ];
    let cascade = cascade_buckets
        .iter()
        .map(|&(bucket, label, amount)| WaterfallEntry {
            bucket,
            label,
            amount,
            percentage_of_super_gross: pct(amount),
        })
        .collect();

    let detail = |bucket: Bucket,
                  label: &'static str,
                  description: &'static str,
                  split: Option<ShareSplit>,
                  breakdown: &'static [&'static str]| {
        let amount = match split {
            Some(s) => s.employee + s.employer,
            None => match bucket {
                Bucket::Tax => tax,
                _ => net,
            },
        };
        DetailedEntry {
            entry: WaterfallEntry {
                bucket,
                label,
                amount,
                percentage_of_super_gross: pct(amount),
            },
            description,
            split,
            breakdown,
        }
    };
    let split = |employee: f64, employer: f64| Some(ShareSplit { employee, employer });

    let detailed = vec![
        detail(
            Bucket::NetPaid,
            "Net payé",
            "Salaire effectivement versé sur votre compte bancaire",
            None,
            &[],
        ),
        detail(
            Bucket::Tax,
            "Impôts",
            "Impôt sur le revenu prélevé à la source (PAS)",
            None,
            &[],
        ),
        detail(
            Bucket::Retirement,
            "Retraite (salarié + employeur)",
            "Finance votre retraite de base et complémentaire (Agirc-Arrco)",
            split(employee.retirement.total, employer.retirement.total),
            RETIREMENT_BREAKDOWN,
        ),
        detail(
            Bucket::Health,
            "Santé (salarié + employeur)",
            "Couvre vos soins médicaux, arrêts maladie, mutuelle et prévoyance",
            split(employee.health.total, employer.health.total),
            HEALTH_BREAKDOWN,
        ),
        detail(
            Bucket::Unemployment,
            "Chômage (salarié + employeur)",
            "Finance vos allocations chômage en cas de perte d'emploi (Pôle Emploi)",
            split(employee.unemployment.total, employer.unemployment.total),
            UNEMPLOYMENT_BREAKDOWN,
        ),
        detail(
            Bucket::Family,
            "Famille",
            "Finance les allocations familiales de la CAF (uniquement payé par l'employeur)",
            split(0.0, employer.family.total),
            FAMILY_BREAKDOWN,
        ),
        detail(
            Bucket::CseAndOther,
            "CSE & Autres",
            "Contributions diverses (CSE, formation, titres restaurant, etc.)",
            split(employee.other.total, employer.cse.total + employer.other.total),
            CSE_OTHER_BREAKDOWN,
        ),
        detail(
            Bucket::CsgCrds,
            "CSG/CRDS",
            "Finance la Sécurité sociale et rembourse sa dette",
            split(employee.csg_crds.total, 0.0),
            CSG_CRDS_BREAKDOWN,
        ),
    ];

    let discrepancies = find_discrepancies(record, super_gross);
    for d in &discrepancies {
        warn!(
            "{}: reported {:.2}, recomputed {:.2} (gap {:+.2})",
            d.path,
            d.reported,
            d.computed,
            d.gap()
        );
    }
    debug!(
        "Reconciled superGross {:.2} ({} discrepancies)",
        super_gross,
        discrepancies.len()
    );

    ReconciledWaterfall {
        super_gross,
        reported_super_gross: record.super_gross,
        headline,
        cascade,
        detailed,
        discrepancies,
    }
}

impl ReconciledWaterfall {
    /// `(label, amount, percentage)` rows of one view.
    pub fn rows(&self, view: View) -> Vec<&WaterfallEntry> {
        match view {
            View::Cascade => self.cascade.iter().collect(),
            View::Detailed => self.detailed.iter().map(|d| &d.entry).collect(),
        }
    }

    /// `true` when every reported aggregate matched its recomputation.
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// One-paragraph French walk from superGross down to net paid.
    pub fn narrative(&self) -> String {
        let h = &self.headline;
        let employer = self.amount_of(Bucket::EmployerContributions);
        let employee = self.amount_of(Bucket::EmployeeContributions);
        let tax = self.amount_of(Bucket::Tax);

        format!(
            "Le superbrut ({:.2} €) représente le coût total pour l'employeur. \
             Après déduction des cotisations patronales ({:.2} €), on obtient le salaire brut ({:.2} €). \
             Les cotisations sociales ({:.2} €) sont ensuite déduites pour obtenir le net avant impôt ({:.2} €). \
             Enfin, l'impôt sur le revenu ({:.2} €) est prélevé pour obtenir le net payé ({:.2} €).",
            h.super_gross.amount,
            employer,
            h.gross.amount,
            employee,
            h.net_before_tax.amount,
            tax,
            h.net_after_tax.amount,
        )
    }

    fn amount_of(&self, bucket: Bucket) -> f64 {
        self.cascade
            .iter()
            .find(|e| e.bucket == bucket)
            .map(|e| e.amount)
            .unwrap_or(0.0)
    }
}

/// Share of `base`, in percent, rounded to one decimal. `NaN` when `base` is zero.
pub fn percentage(amount: f64, base: f64) -> f64 {
    if base == 0.0 {
        return f64::NAN;
    }
    (amount / base * 1000.0).round() / 10.0
}

fn disagrees(reported: f64, computed: f64) -> bool {
    (reported - computed).abs() > TOLERANCE + 1e-9
}

fn find_discrepancies(record: &PayslipRecord, super_gross: f64) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    let mut check = |path: String, reported: f64, computed: f64| {
        if disagrees(reported, computed) {
            out.push(Discrepancy {
                path,
                reported,
                computed,
            });
        }
    };

    let sides: [(&str, f64, Vec<(&str, &ContributionCategory)>); 2] = [
        (
            "employerContributions",
            record.employer_contributions.total,
            record.employer_contributions.categories().to_vec(),
        ),
        (
            "employeeContributions",
            record.employee_contributions.total,
            record.employee_contributions.categories().to_vec(),
        ),
    ];
    for (side, total, categories) in &sides {
        for (name, cat) in categories {
            check(format!("{side}.{name}.total"), cat.total, cat.lines_sum());
        }
        let categories_sum: f64 = categories.iter().map(|(_, c)| c.total).sum();
        check(format!("{side}.total"), *total, categories_sum);
    }
    check("superGross".to_string(), record.super_gross, super_gross);
    out
}
