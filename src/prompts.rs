//! Instruction template for payslip extraction.
//!
//! The template states the extraction policy as numbered, checkable rules
//! (column anchoring, section anchoring, fixed keyword mapping, strict totals)
//! and ends with the output contract. The contract is not written here: it is
//! generated from [`crate::pipeline::request::OutputContract`] and substituted
//! for the `{contract}` placeholder, so the prompt and the validator can never
//! disagree on field names.
//!
//! Callers can override the whole text via
//! [`crate::config::ExtractionConfig::instructions`]; an override without a
//! `{contract}` placeholder gets the contract appended.

/// Placeholder replaced by the rendered output contract.
pub const CONTRACT_PLACEHOLDER: &str = "{contract}";

/// Default instructions. French, like the documents they describe.
pub const DEFAULT_INSTRUCTIONS: &str = r#"Tu es un expert en analyse de fiches de paie françaises.
Analyse la fiche de paie fournie en extrayant TOUS les montants de manière fiable,
et génère un JSON exhaustif avec la structure ci-dessous.

RÈGLES D'EXTRACTION :

1. DISTINCTION ENTRE COLONNES
   - Ne JAMAIS mélanger les cotisations SALARIALES (colonne "A déduire") et PATRONALES (colonne "Charges patronales").
   - Si une même ligne apparaît des deux côtés :
        → le montant "A déduire" va dans "employeeContributions"
        → le montant "Charges patronales" va dans "employerContributions"
   - Si une ligne n'apparaît que dans une colonne, ne crée pas l'autre côté par inférence.

2. ANCRAGE PAR COLONNE
   - Seules les lignes présentes dans la colonne "A déduire" peuvent être classées en "employeeContributions".
   - Seules les lignes présentes dans la colonne "Charges patronales" peuvent être classées en "employerContributions".

3. ANCRAGE PAR SECTION
   - Chaque bloc commence par un intitulé de section explicite (Santé, Retraite, Famille, Assurance chômage, Cotisations statutaires, Autres contributions…).
   - Une ligne appartient STRICTEMENT à la section en cours jusqu'à l'apparition d'un nouveau titre de section.
   - Ne jamais faire "déborder" une ligne d'une section précédente.

4. CATÉGORISATION PAR MOTS-CLÉS (uniquement après l'ancrage par section et par colonne)
   - health → Maladie, Maternité, Invalidité, Incapacité, Décès, Santé, Mutuelle, Accidents du travail
   - retirement → Sécurité Sociale plafonnée, déplafonnée, Complémentaire, Tranche 1/2, Agirc-Arrco
   - family → Famille, Allocations familiales
   - unemployment → Assurance chômage, APEC
   - cse → CSE, Comité, fonctionnement, activités sociales
   - csgCrds → CSG déductible, CSG/CRDS non déductible
   - other → Formation, mobilité, ADESATT, taxes, restauration, Autres contributions dues par l'employeur

5. EXCLUSIONS
   - Les lignes "Autres contributions dues par l'employeur" vont TOUJOURS dans "employerContributions.other", jamais dans "health".
   - "Chômage" ne va dans "employeeContributions" que s'il est visiblement présent dans la colonne "A déduire".

6. LIGNES UNIQUES
   - Si un intitulé apparaît deux fois avec des bases différentes, conserve chaque occurrence séparément avec son montant.
   - Si une ligne a deux montants (salarial et patronal), crée deux lignes distinctes : une par colonne.

7. TOTAUX
   - Le "total" de chaque catégorie est la somme stricte de ses lignes.
   - "employerContributions.total" = somme stricte de toutes les lignes patronales.
   - "employeeContributions.total" = somme stricte de toutes les lignes salariales.
   - "superGross" = grossSalary + employerContributions.total.

8. CATÉGORIES VIDES
   - Une catégorie sans ligne reste présente avec {"total": 0, "lines": []}. Ne supprime jamais une catégorie.

STRUCTURE À RETOURNER :

{contract}

Retourne UNIQUEMENT le JSON valide, sans texte avant ni après.
Aucune phrase, aucun commentaire."#;

/// Substitute the rendered contract into an instruction template.
pub fn render_instructions(template: &str, contract_text: &str) -> String {
    if template.contains(CONTRACT_PLACEHOLDER) {
        template.replace(CONTRACT_PLACEHOLDER, contract_text)
    } else {
        format!("{template}\n\n{contract_text}")
    }
}
