//! Endpoint resolution
//!
//! A static table describing, for every [`DocumentType`], where files are sent
//! and which submission protocol applies. Some types route specific formats to a
//! dedicated endpoint (signed invoices, CAMT statements, SEPA flows), and some use
//! a two-step job protocol where a remote job is created before the file is sent.

use crate::classifier::DocumentType;
use serde::Serialize;

/// Placeholder substituted with the remote job identifier in job upload paths
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

/// How a file reaches its endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Protocol {
    /// One multipart POST to the upload path
    Direct,
    /// Create a job at `create_path`, then POST the file to the upload path
    /// with [`JOB_ID_PLACEHOLDER`] replaced by the job identifier
    Job {
        /// Job creation path
        create_path: &'static str,
    },
}

impl Protocol {
    /// Whether a remote job has to be created first
    pub fn is_job(&self) -> bool {
        matches!(self, Protocol::Job { .. })
    }
}

/// An endpoint together with its protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Upload path, relative to the API base URL
    pub upload_path: &'static str,
    /// Submission protocol
    pub protocol: Protocol,
}

impl Route {
    const fn direct(upload_path: &'static str) -> Self {
        Self {
            upload_path,
            protocol: Protocol::Direct,
        }
    }

    const fn job(create_path: &'static str, upload_path: &'static str) -> Self {
        Self {
            upload_path,
            protocol: Protocol::Job { create_path },
        }
    }
}

/// Format-specific route, selected by the file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FormatOverride {
    /// Lower-case extension without the dot
    pub extension: &'static str,
    /// Route used for files with this extension
    pub route: Route,
}

/// Static description of one document type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentTypeDescriptor {
    /// The type described
    pub document_type: DocumentType,
    /// Human-readable label
    pub label: &'static str,
    /// Extensions the remote parser accepts; empty means any
    pub extensions: &'static [&'static str],
    /// Route used when no override matches
    pub default_route: Route,
    /// Format-specific routes
    pub overrides: &'static [FormatOverride],
}

impl DocumentTypeDescriptor {
    /// Whether the remote parser accepts a file with this name
    pub fn accepts(&self, file_name: &str) -> bool {
        self.extensions.is_empty()
            || extension_of(file_name).is_some_and(|ext| self.extensions.contains(&ext.as_str()))
    }

    /// Route for a file with this name
    pub fn route_for(&self, file_name: &str) -> Route {
        let Some(ext) = extension_of(file_name) else {
            return self.default_route;
        };
        self.overrides
            .iter()
            .find(|o| o.extension == ext)
            .map(|o| o.route)
            .unwrap_or(self.default_route)
    }
}

/// Outcome of [`resolve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    /// Type the file is submitted as
    pub document_type: DocumentType,
    /// Upload path (may contain [`JOB_ID_PLACEHOLDER`] for job protocols)
    pub upload_path: &'static str,
    /// Submission protocol
    pub protocol: Protocol,
}

impl ResolvedEndpoint {
    /// Upload path with the job identifier filled in
    ///
    /// The identifier is percent-encoded as a single path segment. Returns
    /// `None` for identifiers that cannot name a segment (empty, `.` or `..`).
    pub fn upload_path_for_job(&self, job_id: &str) -> Option<String> {
        if matches!(job_id, "" | "." | "..") {
            return None;
        }
        Some(
            self.upload_path
                .replace(JOB_ID_PLACEHOLDER, &urlencoding::encode(job_id)),
        )
    }
}

static REGISTRY: [DocumentTypeDescriptor; 10] = [
    DocumentTypeDescriptor {
        document_type: DocumentType::ElectronicInvoice,
        label: "Fatture elettroniche",
        extensions: &["xml", "p7m", "zip"],
        default_route: Route::direct("/api/invoices/import"),
        overrides: &[FormatOverride {
            extension: "p7m",
            route: Route::direct("/api/invoices/import-signed"),
        }],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::BankStatement,
        label: "Estratti conto",
        extensions: &["xlsx", "xls", "csv", "xml", "pdf"],
        default_route: Route::direct("/api/bank-statements/import"),
        overrides: &[
            FormatOverride {
                extension: "xml",
                route: Route::direct("/api/bank-statements/import-camt"),
            },
            FormatOverride {
                extension: "pdf",
                route: Route::job(
                    "/api/bank-statements/jobs",
                    "/api/bank-statements/jobs/{job_id}/file",
                ),
            },
        ],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::TaxForm,
        label: "Modelli F24",
        extensions: &["pdf"],
        default_route: Route::direct("/api/tax-forms/import"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::Payslip,
        label: "Cedolini / LUL",
        extensions: &["pdf"],
        default_route: Route::job("/api/payroll/jobs", "/api/payroll/jobs/{job_id}/file"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::WireTransfer,
        label: "Bonifici",
        extensions: &["xml", "xlsx", "csv", "pdf"],
        default_route: Route::direct("/api/wire-transfers/import"),
        overrides: &[FormatOverride {
            extension: "xml",
            route: Route::direct("/api/wire-transfers/import-sepa"),
        }],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::DailyReceipts,
        label: "Corrispettivi",
        extensions: &["xml", "xlsx", "csv"],
        default_route: Route::direct("/api/daily-receipts/import"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::CardSettlement,
        label: "Incassi POS",
        extensions: &["xlsx", "csv", "pdf"],
        default_route: Route::direct("/api/card-settlements/import"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::CashDeposit,
        label: "Versamenti",
        extensions: &["xlsx", "csv", "pdf"],
        default_route: Route::direct("/api/cash-deposits/import"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::SupplierRegistry,
        label: "Anagrafica fornitori",
        extensions: &["xlsx", "csv"],
        default_route: Route::direct("/api/suppliers/import"),
        overrides: &[],
    },
    DocumentTypeDescriptor {
        document_type: DocumentType::Unclassified,
        label: "Rilevamento automatico",
        extensions: &[],
        default_route: Route::direct("/api/documents/auto-detect"),
        overrides: &[],
    },
];

/// Every descriptor, in [`DocumentType::ALL`] order
pub fn descriptors() -> &'static [DocumentTypeDescriptor] {
    &REGISTRY
}

/// Descriptor for one document type
pub fn descriptor(document_type: DocumentType) -> &'static DocumentTypeDescriptor {
    // REGISTRY is laid out in DocumentType::ALL order
    let index = DocumentType::ALL
        .iter()
        .position(|t| *t == document_type)
        .unwrap_or(REGISTRY.len() - 1);
    &REGISTRY[index]
}

/// Resolve the endpoint and protocol for a file submitted as `document_type`
///
/// # Example
/// ```
/// use docingest::classifier::DocumentType;
/// use docingest::registry::{resolve, Protocol};
///
/// let endpoint = resolve(DocumentType::TaxForm, "F24_2024.pdf");
/// assert_eq!(endpoint.upload_path, "/api/tax-forms/import");
/// assert_eq!(endpoint.protocol, Protocol::Direct);
/// ```
pub fn resolve(document_type: DocumentType, file_name: &str) -> ResolvedEndpoint {
    let route = descriptor(document_type).route_for(file_name);
    ResolvedEndpoint {
        document_type,
        upload_path: route.upload_path,
        protocol: route.protocol,
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}
