//! Filename-based document type classification
//!
//! Classification is a pure function of the file name. An ordered table of
//! keyword rules is evaluated top to bottom against the lower-cased name and the
//! first match wins; when nothing matches, the extension decides. The caller may
//! override the suggested type before submission.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document types understood by the ingestion API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Electronic invoice (FatturaPA XML)
    ElectronicInvoice,
    /// Bank statement
    BankStatement,
    /// F24 tax payment form
    TaxForm,
    /// Payslip / payroll book
    Payslip,
    /// Wire transfer (SEPA) list
    WireTransfer,
    /// Daily receipts (corrispettivi)
    DailyReceipts,
    /// Card (POS) settlement report
    CardSettlement,
    /// Cash deposit slip
    CashDeposit,
    /// Supplier registry
    SupplierRegistry,
    /// No rule matched; routed to remote auto-detection
    Unclassified,
}

impl DocumentType {
    /// Every document type, in registry order
    pub const ALL: [DocumentType; 10] = [
        DocumentType::ElectronicInvoice,
        DocumentType::BankStatement,
        DocumentType::TaxForm,
        DocumentType::Payslip,
        DocumentType::WireTransfer,
        DocumentType::DailyReceipts,
        DocumentType::CardSettlement,
        DocumentType::CashDeposit,
        DocumentType::SupplierRegistry,
        DocumentType::Unclassified,
    ];

    /// Stable identifier, also sent as the multipart discriminator field
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::ElectronicInvoice => "electronic_invoice",
            DocumentType::BankStatement => "bank_statement",
            DocumentType::TaxForm => "tax_form",
            DocumentType::Payslip => "payslip",
            DocumentType::WireTransfer => "wire_transfer",
            DocumentType::DailyReceipts => "daily_receipts",
            DocumentType::CardSettlement => "card_settlement",
            DocumentType::CashDeposit => "cash_deposit",
            DocumentType::SupplierRegistry => "supplier_registry",
            DocumentType::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown document type identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document type: {0}")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDocumentType(s.to_string()))
    }
}

/// Predicate applied to a lower-cased file name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Name contains any of the keywords
    ContainsAny(&'static [&'static str]),
    /// Name ends with the suffix and contains the keyword
    EndsWithAndContains(&'static str, &'static str),
    /// Name ends with the suffix or contains the keyword
    EndsWithOrContains(&'static str, &'static str),
}

impl Predicate {
    /// Evaluate against an already lower-cased name
    pub fn matches(&self, lower_name: &str) -> bool {
        match self {
            Predicate::ContainsAny(keywords) => keywords.iter().any(|k| lower_name.contains(k)),
            Predicate::EndsWithAndContains(suffix, keyword) => {
                lower_name.ends_with(suffix) && lower_name.contains(keyword)
            }
            Predicate::EndsWithOrContains(suffix, keyword) => {
                lower_name.ends_with(suffix) || lower_name.contains(keyword)
            }
        }
    }
}

/// One row of the classification table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    /// Condition on the lower-cased name
    pub predicate: Predicate,
    /// Type assigned when the condition holds
    pub document_type: DocumentType,
}

/// Keyword rules, highest precedence first
///
/// The first row pins `fattura` + `.xml` to electronic invoices even when the
/// name also carries other keywords (e.g. `fattura_conto_2024.xml`).
pub const RULES: &[Rule] = &[
    Rule {
        predicate: Predicate::EndsWithAndContains(".xml", "fattura"),
        document_type: DocumentType::ElectronicInvoice,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["estratto", "conto", "movimenti"]),
        document_type: DocumentType::BankStatement,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["f24"]),
        document_type: DocumentType::TaxForm,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["cedolin", "busta", "paga", "libro_unico", "lul"]),
        document_type: DocumentType::Payslip,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["bonifico", "bonifici", "sepa"]),
        document_type: DocumentType::WireTransfer,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["corrispettiv"]),
        document_type: DocumentType::DailyReceipts,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["pos", "incass"]),
        document_type: DocumentType::CardSettlement,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["versament"]),
        document_type: DocumentType::CashDeposit,
    },
    Rule {
        predicate: Predicate::ContainsAny(&["fornitor", "supplier"]),
        document_type: DocumentType::SupplierRegistry,
    },
    Rule {
        predicate: Predicate::EndsWithOrContains(".xml", "fattura"),
        document_type: DocumentType::ElectronicInvoice,
    },
];

/// Extension-only fallback, used when no keyword rule matches
pub const EXTENSION_FALLBACK: &[(&str, DocumentType)] = &[
    ("xml", DocumentType::ElectronicInvoice),
    ("xlsx", DocumentType::BankStatement),
    ("xls", DocumentType::BankStatement),
    ("ods", DocumentType::BankStatement),
    ("csv", DocumentType::CashDeposit),
    ("pdf", DocumentType::Unclassified),
];

/// How a classification was reached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Match {
    /// Keyword rule at this index of [`RULES`]
    Rule(usize),
    /// Extension fallback
    Extension(&'static str),
    /// Nothing matched
    None,
}

/// Classify a file name, reporting which rule decided
pub fn classify_with_rule(file_name: &str) -> (DocumentType, Match) {
    let lower = file_name.to_lowercase();

    if let Some((index, rule)) = RULES
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.predicate.matches(&lower))
    {
        return (rule.document_type, Match::Rule(index));
    }

    if let Some((_, ext)) = lower.rsplit_once('.')
        && let Some(&(known, document_type)) = EXTENSION_FALLBACK.iter().find(|(e, _)| *e == ext)
    {
        return (document_type, Match::Extension(known));
    }

    (DocumentType::Unclassified, Match::None)
}

/// Classify a file name into a document type
///
/// # Example
///
/// ```
/// use docingest::classifier::{classify, DocumentType};
///
/// assert_eq!(classify("F24_2024.pdf"), DocumentType::TaxForm);
/// assert_eq!(classify("report_sconosciuto.txt"), DocumentType::Unclassified);
/// ```
pub fn classify(file_name: &str) -> DocumentType {
    classify_with_rule(file_name).0
}
