use std::fmt;

use serde::Serialize;

use crate::types::{TransactionFilter, TransactionStatus};
use crate::widgets::HeaderWidget;

/// Admin panel resources exposed by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    KategoriCatatan,
    LaporanKasir,
    Transaksi,
}

impl Resource {
    pub const ALL: [Self; 3] = [Self::KategoriCatatan, Self::LaporanKasir, Self::Transaksi];

    /// URL segment under `/admin`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::KategoriCatatan => "kategori-catatan",
            Self::LaporanKasir => "laporan-kasir",
            Self::Transaksi => "transaksi",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|resource| resource.slug() == slug)
    }

    /// Directory of the client components rendering this resource.
    pub fn component_dir(self) -> &'static str {
        match self {
            Self::KategoriCatatan => "KategoriCatatan",
            Self::LaporanKasir => "LaporanKasir",
            Self::Transaksi => "Transaksi",
        }
    }

    pub fn model_label(self) -> &'static str {
        match self {
            Self::KategoriCatatan => "Kategori Catatan",
            Self::LaporanKasir => "Laporan Kasir",
            Self::Transaksi => "Transaksi",
        }
    }

    /// Label derived from the model name, used as the default list title.
    pub fn plural_model_label(self) -> &'static str {
        match self {
            Self::KategoriCatatan => "Kategori Catatans",
            Self::LaporanKasir => "Laporan Kasirs",
            Self::Transaksi => "Transaksis",
        }
    }

    /// Columns shown by the list table, in display order.
    pub fn table_columns(self) -> &'static [Column] {
        match self {
            Self::KategoriCatatan => &[
                Column { name: "name", label: "Nama" },
                Column { name: "description", label: "Deskripsi" },
                Column { name: "created_at", label: "Dibuat" },
            ],
            Self::LaporanKasir => &[
                Column { name: "report_date", label: "Tanggal" },
                Column { name: "note_category_id", label: "Kategori" },
                Column { name: "description", label: "Keterangan" },
                Column { name: "amount", label: "Jumlah" },
            ],
            Self::Transaksi => &[
                Column { name: "code", label: "Kode" },
                Column { name: "customer_name", label: "Pelanggan" },
                Column { name: "total", label: "Total" },
                Column { name: "status", label: "Status" },
                Column { name: "created_at", label: "Dibuat" },
            ],
        }
    }

    /// Fields of the create/edit form.
    pub fn form_schema(self) -> Vec<FormField> {
        match self {
            Self::KategoriCatatan => vec![
                FormField::new("name", "Nama", FieldKind::Text).required(),
                FormField::new("description", "Deskripsi", FieldKind::Textarea),
            ],
            Self::LaporanKasir => vec![
                FormField::new("note_category_id", "Kategori Catatan", FieldKind::Relation)
                    .required(),
                FormField::new("report_date", "Tanggal", FieldKind::Date).required(),
                FormField::new("description", "Keterangan", FieldKind::Textarea).required(),
                FormField::new("amount", "Jumlah", FieldKind::Money).required(),
            ],
            Self::Transaksi => vec![
                FormField::new("code", "Kode", FieldKind::Text).required(),
                FormField::new("customer_name", "Pelanggan", FieldKind::Text),
                FormField::new("total", "Total", FieldKind::Money).required(),
                FormField::new(
                    "status",
                    "Status",
                    FieldKind::Select {
                        options: TransactionStatus::ALL
                            .into_iter()
                            .map(|status| SelectOption {
                                value: status.as_str(),
                                label: status.label(),
                            })
                            .collect(),
                    },
                )
                .required(),
            ],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
}

impl FormField {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Date,
    Money,
    /// Options are loaded from the related resource at render time.
    Relation,
    Select { options: Vec<SelectOption> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Screen of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    List,
    Create,
    Edit,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Edit => "edit",
        }
    }

    fn component_name(self) -> &'static str {
        match self {
            Self::List => "List",
            Self::Create => "Create",
            Self::Edit => "Edit",
        }
    }
}

/// Button rendered in the page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderAction {
    Create,
    Delete,
}

impl HeaderAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Create => "Buat",
            Self::Delete => "Hapus",
        }
    }

    /// Whether the runtime should ask for confirmation before dispatching.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// Named, pre-filtered view of a list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tab {
    /// `None` is the unfiltered tab.
    pub key: Option<&'static str>,
    pub label: &'static str,
    pub filter: TransactionFilter,
}

impl Tab {
    pub fn all(label: &'static str) -> Self {
        Self {
            key: None,
            label,
            filter: TransactionFilter::all(),
        }
    }

    pub fn status(status: TransactionStatus) -> Self {
        Self {
            key: Some(status.as_str()),
            label: status.label(),
            filter: TransactionFilter::with_status(status),
        }
    }
}

/// Picks the tab addressed by `key`, falling back to the first tab when the
/// key is missing or unknown. Returns `None` only when `tabs` is empty.
pub fn resolve_tab<'a>(tabs: &'a [Tab], key: Option<&str>) -> Option<&'a Tab> {
    key.and_then(|wanted| tabs.iter().find(|tab| tab.key == Some(wanted)))
        .or_else(|| tabs.first())
}

/// Declarative configuration of one resource screen, consulted by the HTTP
/// runtime when it builds the page object.
pub trait ResourcePage: Send + Sync {
    fn resource(&self) -> Resource;

    fn kind(&self) -> PageKind;

    fn header_actions(&self) -> Vec<HeaderAction>;

    fn title(&self) -> String {
        let resource = self.resource();
        match self.kind() {
            PageKind::List => resource.plural_model_label().to_string(),
            PageKind::Create => format!("Buat {}", resource.model_label()),
            PageKind::Edit => format!("Ubah {}", resource.model_label()),
        }
    }

    fn tabs(&self) -> Vec<Tab> {
        Vec::new()
    }

    fn header_widgets(&self) -> Vec<HeaderWidget> {
        Vec::new()
    }

    /// Client component name, e.g. `Resources/Transaksi/List`.
    fn component(&self) -> String {
        format!(
            "Resources/{}/{}",
            self.resource().component_dir(),
            self.kind().component_name()
        )
    }
}

macro_rules! create_page {
    ($name:ident, $resource:expr) => {
        pub struct $name;

        impl ResourcePage for $name {
            fn resource(&self) -> Resource {
                $resource
            }

            fn kind(&self) -> PageKind {
                PageKind::Create
            }

            fn header_actions(&self) -> Vec<HeaderAction> {
                Vec::new()
            }
        }
    };
}

macro_rules! edit_page {
    ($name:ident, $resource:expr) => {
        pub struct $name;

        impl ResourcePage for $name {
            fn resource(&self) -> Resource {
                $resource
            }

            fn kind(&self) -> PageKind {
                PageKind::Edit
            }

            fn header_actions(&self) -> Vec<HeaderAction> {
                vec![HeaderAction::Delete]
            }
        }
    };
}

pub struct ListKategoriCatatan;

impl ResourcePage for ListKategoriCatatan {
    fn resource(&self) -> Resource {
        Resource::KategoriCatatan
    }

    fn kind(&self) -> PageKind {
        PageKind::List
    }

    fn header_actions(&self) -> Vec<HeaderAction> {
        vec![HeaderAction::Create]
    }
}

create_page!(CreateKategoriCatatan, Resource::KategoriCatatan);
edit_page!(EditKategoriCatatan, Resource::KategoriCatatan);

pub struct ListLaporanKasir;

impl ResourcePage for ListLaporanKasir {
    fn resource(&self) -> Resource {
        Resource::LaporanKasir
    }

    fn kind(&self) -> PageKind {
        PageKind::List
    }

    fn header_actions(&self) -> Vec<HeaderAction> {
        vec![HeaderAction::Create]
    }

    fn title(&self) -> String {
        "Laporan Kasir".to_string()
    }
}

create_page!(CreateLaporanKasir, Resource::LaporanKasir);
edit_page!(EditLaporanKasir, Resource::LaporanKasir);

pub struct ListTransaksi;

impl ResourcePage for ListTransaksi {
    fn resource(&self) -> Resource {
        Resource::Transaksi
    }

    fn kind(&self) -> PageKind {
        PageKind::List
    }

    fn header_actions(&self) -> Vec<HeaderAction> {
        vec![HeaderAction::Create]
    }

    fn title(&self) -> String {
        "Transaksi".to_string()
    }

    fn tabs(&self) -> Vec<Tab> {
        vec![
            Tab::all("Semua"),
            Tab::status(TransactionStatus::Pending),
            Tab::status(TransactionStatus::Failed),
            Tab::status(TransactionStatus::Paid),
        ]
    }

    fn header_widgets(&self) -> Vec<HeaderWidget> {
        vec![HeaderWidget::TransactionStats]
    }
}

create_page!(CreateTransaksi, Resource::Transaksi);
edit_page!(EditTransaksi, Resource::Transaksi);

/// Looks up the page configuration registered for a resource screen.
pub fn page_for(resource: Resource, kind: PageKind) -> &'static dyn ResourcePage {
    match (resource, kind) {
        (Resource::KategoriCatatan, PageKind::List) => &ListKategoriCatatan,
        (Resource::KategoriCatatan, PageKind::Create) => &CreateKategoriCatatan,
        (Resource::KategoriCatatan, PageKind::Edit) => &EditKategoriCatatan,
        (Resource::LaporanKasir, PageKind::List) => &ListLaporanKasir,
        (Resource::LaporanKasir, PageKind::Create) => &CreateLaporanKasir,
        (Resource::LaporanKasir, PageKind::Edit) => &EditLaporanKasir,
        (Resource::Transaksi, PageKind::List) => &ListTransaksi,
        (Resource::Transaksi, PageKind::Create) => &CreateTransaksi,
        (Resource::Transaksi, PageKind::Edit) => &EditTransaksi,
    }
}
