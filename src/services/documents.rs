//! Purchase order documents: an HTML rendition of an order and its PDF print.
//!
//! PDFs are produced by a headless Chromium process behind [`PdfRenderer`].
//! A semaphore caps how many browsers run at once and every render has a
//! deadline; the child process is killed if the request goes away.

use crate::{
    config::CompanyConfig,
    errors::ServiceError,
    metrics,
    money::{format_amount, Currency},
    services::orders::{OrderDetail, OrderService},
};
use async_trait::async_trait;
use chrono::{Duration as DateDuration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{process::Command, sync::Semaphore};
use tracing::{debug, error, info, instrument, warn};

/// Smallest byte count a real PDF can have (`%PDF-` header).
const PDF_MAGIC: &[u8] = b"%PDF-";
const DEFAULT_DELIVERY_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    #[default]
    Attachment,
}

impl Disposition {
    pub fn header_value(self, filename: &str) -> String {
        let kind = match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        };
        format!("{}; filename=\"{}\"", kind, filename)
    }
}

/// One printed order line.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentLine {
    pub product_code: String,
    pub unit_of_measure: String,
    pub product_name: String,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub subtotal: String,
}

/// Everything printed on a purchase order, already formatted.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDocument {
    pub company: CompanyConfig,
    pub order_number: String,
    pub order_date: String,
    pub delivery_date: String,
    pub status_label: &'static str,
    pub currency: Currency,
    pub currency_symbol: &'static str,
    pub supplier_name: String,
    pub supplier_contact_person: String,
    pub supplier_email: String,
    pub supplier_phone: String,
    pub supplier_address: String,
    pub supplier_city: String,
    pub supplier_country: String,
    pub supplier_tax_id: String,
    pub delivery_address: String,
    pub cost_center: Option<String>,
    pub payment_terms: String,
    pub notes: String,
    pub lines: Vec<DocumentLine>,
    pub subtotal: String,
    pub tax: String,
    pub total: String,
}

fn display_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

fn display_quantity(quantity: Decimal) -> String {
    let normalized = quantity.normalize();
    format_amount(normalized, normalized.scale())
}

impl OrderDocument {
    pub fn from_detail(detail: &OrderDetail, company: &CompanyConfig) -> Self {
        let order = &detail.order;
        let currency = order.currency;
        let money = |value: Decimal| format_amount(value, currency.decimals());
        let supplier = detail.supplier.as_ref();
        let text = |value: Option<&String>| value.cloned().unwrap_or_default();
        let delivery = order
            .delivery_date
            .unwrap_or(order.order_date + DateDuration::days(DEFAULT_DELIVERY_DAYS));

        Self {
            company: company.clone(),
            order_number: order.order_number.clone(),
            order_date: display_date(order.order_date),
            delivery_date: display_date(delivery),
            status_label: order.status.label(),
            currency,
            currency_symbol: currency.symbol(),
            supplier_name: supplier
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "N/A".to_string()),
            supplier_contact_person: text(supplier.and_then(|s| s.contact_person.as_ref())),
            supplier_email: text(supplier.and_then(|s| s.email.as_ref())),
            supplier_phone: text(supplier.and_then(|s| s.phone.as_ref())),
            supplier_address: text(supplier.and_then(|s| s.address.as_ref())),
            supplier_city: text(supplier.and_then(|s| s.city.as_ref())),
            supplier_country: text(supplier.and_then(|s| s.country.as_ref())),
            supplier_tax_id: text(supplier.and_then(|s| s.tax_id.as_ref())),
            delivery_address: order
                .shipping_address
                .clone()
                .unwrap_or_else(|| company.address.clone()),
            cost_center: detail
                .cost_center
                .as_ref()
                .map(|cc| format!("{} - {}", cc.code, cc.name)),
            payment_terms: text(order.payment_terms.as_ref()),
            notes: text(order.notes.as_ref()),
            lines: detail
                .items
                .iter()
                .map(|item| DocumentLine {
                    product_code: text(item.product_code.as_ref()),
                    unit_of_measure: text(item.unit_of_measure.as_ref()),
                    product_name: item.product_name.clone(),
                    description: text(item.description.as_ref()),
                    quantity: display_quantity(item.quantity),
                    unit_price: money(item.unit_price),
                    subtotal: money(item.total_price),
                })
                .collect(),
            subtotal: money(order.subtotal),
            tax: money(order.tax_amount),
            total: money(order.total_amount),
        }
    }

    pub fn filename(&self) -> String {
        let safe: String = self
            .order_number
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("Orden_Compra_{}.pdf", safe)
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const DOCUMENT_STYLE: &str = r#"
body { font-family: Arial, sans-serif; font-size: 12px; color: #333; margin: 0; padding: 20px; }
.header-flex, .parties-flex { display: flex; justify-content: space-between; gap: 20px; }
.header { border-bottom: 2px solid #0066cc; padding-bottom: 15px; margin-bottom: 20px; }
.company-info h1 { color: #0066cc; font-size: 20px; margin: 0 0 8px 0; }
.order-box { border: 2px solid #0066cc; padding: 12px; min-width: 220px; }
.order-box h2 { color: #0066cc; font-size: 16px; margin: 0 0 8px 0; text-align: center; }
.party-box { flex: 1; border: 1px solid #ddd; padding: 12px; background: #f9f9f9; }
.party-box h3, h3.section { color: #0066cc; font-size: 13px; margin: 0 0 8px 0; }
h3.section { border-bottom: 1px solid #0066cc; padding-bottom: 5px; margin: 20px 0 12px 0; }
.items-table { width: 100%; border-collapse: collapse; }
.items-table th { background: #0066cc; color: #fff; padding: 8px; text-align: left; }
.items-table td { border-bottom: 1px solid #eee; padding: 8px; vertical-align: top; }
.muted { color: #666; font-size: 10px; }
.totals-wrapper { display: flex; justify-content: flex-end; margin-top: 20px; }
.totals td { padding: 4px 8px; }
.totals .amount { text-align: right; }
.total-final td { font-weight: bold; font-size: 14px; border-top: 2px solid #0066cc; }
.footer { margin-top: 40px; border-top: 1px solid #ddd; padding-top: 10px; color: #666; font-size: 10px; text-align: center; }
"#;

/// Renders the purchase order document as a standalone HTML page.
pub fn render_order_html(doc: &OrderDocument) -> String {
    let e = escape_html;
    let amount = |value: &str| {
        format!(
            "{}{} {}",
            e(doc.currency_symbol),
            e(value),
            doc.currency.code()
        )
    };
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8">
<title>Orden de Compra {number}</title>
<style>{style}</style>
</head>
<body>
<div class="header"><div class="header-flex">
<div class="company-info">
<h1>{company}</h1>
<div><strong>RUT:</strong> {tax_id}</div>
<div><strong>Dirección:</strong> {address}</div>
<div><strong>Teléfono:</strong> {phone}</div>
<div><strong>Email:</strong> {email}</div>
</div>
<div class="order-box">
<h2>ORDEN DE COMPRA</h2>
<div><strong>N°:</strong> {number}</div>
<div><strong>Fecha:</strong> {date}</div>
<div><strong>Estado:</strong> {status}</div>
<div><strong>Total:</strong> {total}</div>
</div>
</div></div>
"#,
        number = e(&doc.order_number),
        style = DOCUMENT_STYLE,
        company = e(&doc.company.name),
        tax_id = e(&doc.company.tax_id),
        address = e(&doc.company.address),
        phone = e(&doc.company.phone),
        email = e(&doc.company.email),
        date = e(&doc.order_date),
        status = e(doc.status_label),
        total = amount(&doc.total),
    );

    let _ = write!(
        html,
        r#"<div class="parties"><div class="parties-flex">
<div class="party-box">
<h3>Datos del Proveedor</h3>
<div><strong>Empresa:</strong> {name}</div>
<div><strong>Contacto:</strong> {contact}</div>
<div><strong>Email:</strong> {email}</div>
<div><strong>Teléfono:</strong> {phone}</div>
<div><strong>Dirección:</strong> {address}</div>
<div><strong>Ciudad:</strong> {city}, {country}</div>
<div><strong>RUT:</strong> {tax_id}</div>
</div>
<div class="party-box">
<h3>Información de Entrega</h3>
<div><strong>Entregar a:</strong> {company}</div>
<div><strong>Dirección:</strong> {delivery_address}</div>
<div><strong>Fecha Estimada:</strong> {delivery_date}</div>
"#,
        name = e(&doc.supplier_name),
        contact = e(&doc.supplier_contact_person),
        email = e(&doc.supplier_email),
        phone = e(&doc.supplier_phone),
        address = e(&doc.supplier_address),
        city = e(&doc.supplier_city),
        country = e(&doc.supplier_country),
        tax_id = e(&doc.supplier_tax_id),
        company = e(&doc.company.name),
        delivery_address = e(&doc.delivery_address),
        delivery_date = e(&doc.delivery_date),
    );
    if let Some(cost_center) = &doc.cost_center {
        let _ = writeln!(
            html,
            "<div><strong>Centro de Costo:</strong> {}</div>",
            e(cost_center)
        );
    }
    if !doc.payment_terms.is_empty() {
        let _ = writeln!(
            html,
            "<div><strong>Condiciones de Pago:</strong> {}</div>",
            e(&doc.payment_terms)
        );
    }
    let _ = writeln!(
        html,
        "<div><strong>Observaciones:</strong> {}</div>\n</div>\n</div></div>",
        e(&doc.notes)
    );

    html.push_str(
        r#"<h3 class="section">Detalle de Productos y Servicios</h3>
<table class="items-table">
<thead><tr><th>Código</th><th>Descripción</th><th>Cantidad</th><th>Precio Unit.</th><th>Subtotal</th></tr></thead>
<tbody>
"#,
    );
    for line in &doc.lines {
        let _ = writeln!(
            html,
            r#"<tr><td><div>{code}</div><div class="muted">{uom}</div></td><td><div><strong>{name}</strong></div><div class="muted">{description}</div></td><td>{quantity}</td><td>{symbol}{unit_price}</td><td>{symbol}{subtotal}</td></tr>"#,
            code = e(&line.product_code),
            uom = e(&line.unit_of_measure),
            name = e(&line.product_name),
            description = e(&line.description),
            quantity = e(&line.quantity),
            symbol = e(doc.currency_symbol),
            unit_price = e(&line.unit_price),
            subtotal = e(&line.subtotal),
        );
    }

    let _ = write!(
        html,
        r#"</tbody>
</table>
<div class="totals-wrapper"><div class="totals"><table>
<tr><td class="label">Subtotal (Neto):</td><td class="amount">{subtotal}</td></tr>
<tr><td class="label">IVA (19%):</td><td class="amount">{tax}</td></tr>
<tr class="total-final"><td class="label">Total:</td><td class="amount">{total}</td></tr>
</table></div></div>
<div class="footer">
<p>Este documento ha sido generado automáticamente por el sistema de gestión de compras de {company}.</p>
<p>Para consultas, contactar a: {purchasing}</p>
</div>
</body>
</html>
"#,
        subtotal = amount(&doc.subtotal),
        tax = amount(&doc.tax),
        total = amount(&doc.total),
        company = e(&doc.company.name),
        purchasing = e(&doc.company.purchasing_email),
    );

    html
}

/// Turns an HTML document into PDF bytes.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Prints HTML to PDF with a headless Chromium process per document.
pub struct ChromiumRenderer {
    browser_path: String,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(browser_path: impl Into<String>, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            browser_path: browser_path.into(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    async fn print(&self, html: &str) -> Result<Vec<u8>, ServiceError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| ServiceError::RenderError(format!("cannot create scratch dir: {}", e)))?;
        let input = workdir.path().join("order.html");
        let output = workdir.path().join("order.pdf");
        tokio::fs::write(&input, html)
            .await
            .map_err(|e| ServiceError::RenderError(format!("cannot write document: {}", e)))?;

        let child = Command::new(&self.browser_path)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", input.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ServiceError::RenderError(format!(
                    "cannot start browser '{}': {}",
                    self.browser_path, e
                ))
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ServiceError::RenderError(format!(
                    "browser did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ServiceError::RenderError(format!("browser failed: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ServiceError::RenderError(format!(
                "browser exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| ServiceError::RenderError(format!("no PDF was produced: {}", e)))?;
        check_pdf(bytes)
    }
}

fn check_pdf(bytes: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
    if bytes.len() < PDF_MAGIC.len() || !bytes.starts_with(PDF_MAGIC) {
        return Err(ServiceError::RenderError(format!(
            "browser output is not a PDF ({} bytes)",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ServiceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ServiceError::RenderError(e.to_string()))?;
        debug!(available = self.permits.available_permits(), "PDF render slot acquired");
        self.print(html).await
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Builds order documents and prints them
#[derive(Clone)]
pub struct DocumentService {
    orders: OrderService,
    renderer: Arc<dyn PdfRenderer>,
    company: CompanyConfig,
}

impl DocumentService {
    pub fn new(orders: OrderService, renderer: Arc<dyn PdfRenderer>, company: CompanyConfig) -> Self {
        Self {
            orders,
            renderer,
            company,
        }
    }

    pub async fn order_document(&self, order_id: i32) -> Result<OrderDocument, ServiceError> {
        let detail = self.orders.get_order(order_id).await?;
        Ok(OrderDocument::from_detail(&detail, &self.company))
    }

    #[instrument(skip(self))]
    pub async fn order_html(&self, order_id: i32) -> Result<String, ServiceError> {
        Ok(render_order_html(&self.order_document(order_id).await?))
    }

    #[instrument(skip(self))]
    pub async fn order_pdf(&self, order_id: i32) -> Result<RenderedPdf, ServiceError> {
        let doc = self.order_document(order_id).await?;
        let html = render_order_html(&doc);

        let started = Instant::now();
        match self.renderer.render(&html).await {
            Ok(bytes) => {
                metrics::record_pdf_rendered(started.elapsed());
                info!(
                    order_id,
                    size = bytes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Purchase order PDF rendered"
                );
                Ok(RenderedPdf {
                    filename: doc.filename(),
                    bytes,
                })
            }
            Err(e) => {
                metrics::record_pdf_failed();
                error!(order_id, error = %e, "Purchase order PDF rendering failed");
                Err(e)
            }
        }
    }
}

/// Renderer used when no browser is wanted, e.g. in tests.
pub struct StaticPdfRenderer {
    bytes: Vec<u8>,
}

impl StaticPdfRenderer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl PdfRenderer for StaticPdfRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ServiceError> {
        if html.is_empty() {
            warn!("Empty document handed to the static renderer");
        }
        check_pdf(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        cost_center, purchase_order::{self, OrderStatus}, purchase_order_item, supplier,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn detail(currency: Currency) -> OrderDetail {
        let now = Utc::now();
        OrderDetail {
            order: purchase_order::Model {
                id: 1,
                order_number: "AIL-2025-0007".into(),
                supplier_id: Some(3),
                cost_center_id: 2,
                currency,
                order_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                delivery_date: None,
                status: OrderStatus::Approved,
                subtotal: dec!(1234.5),
                tax_amount: dec!(234.56),
                total_amount: dec!(1469.06),
                payment_terms: Some("30 días".into()),
                notes: Some("Entregar en <bodega> & portería".into()),
                billing_address: None,
                shipping_address: None,
                created_at: now,
                updated_at: now,
            },
            supplier: Some(supplier::Model {
                id: 3,
                name: "Acme Industrial Ltda".into(),
                contact_person: Some("Juan Soto".into()),
                email: None,
                phone: None,
                address: None,
                city: Some("Santiago".into()),
                country: Some("Chile".into()),
                tax_id: Some("76.123.456-7".into()),
                payment_terms: None,
                created_at: now,
                updated_at: now,
            }),
            cost_center: Some(cost_center::Model {
                id: 2,
                code: "CC-IT".into(),
                name: "Tecnología".into(),
                description: None,
                owner: None,
                is_active: true,
                center_type: None,
                manager: None,
                email: None,
                department: None,
                currency,
                approval_limit: None,
                requires_approval: false,
                created_at: now,
                updated_at: now,
            }),
            items: vec![purchase_order_item::Model {
                id: 1,
                order_id: 1,
                product_id: None,
                product_name: "Cable UTP".into(),
                product_code: Some("PROV3-PROD001".into()),
                description: None,
                quantity: dec!(2.50),
                unit_price: dec!(493.8),
                total_price: dec!(1234.5),
                unit_of_measure: Some("MT".into()),
            }],
        }
    }

    #[test]
    fn document_formats_per_currency() {
        let company = CompanyConfig::default();
        let clp = OrderDocument::from_detail(&detail(Currency::Clp), &company);
        assert_eq!(clp.total, "1.469");
        assert_eq!(clp.order_date, "15-01-2025");
        assert_eq!(clp.delivery_date, "22-01-2025");
        assert_eq!(clp.status_label, "Aprobada");
        assert_eq!(clp.lines[0].quantity, "2,5");

        let usd = OrderDocument::from_detail(&detail(Currency::Usd), &company);
        assert_eq!(usd.total, "1.469,06");
        let uf = OrderDocument::from_detail(&detail(Currency::Uf), &company);
        assert_eq!(uf.tax, "234,5600");
        assert_eq!(uf.currency_symbol, "UF ");
        assert_eq!(uf.filename(), "Orden_Compra_AIL-2025-0007.pdf");
    }

    #[test]
    fn html_escapes_user_text() {
        let doc = OrderDocument::from_detail(&detail(Currency::Usd), &CompanyConfig::default());
        let html = render_order_html(&doc);
        assert!(html.contains("Entregar en &lt;bodega&gt; &amp; portería"));
        assert!(html.contains("US$ 1.469,06 USD"));
        assert!(html.contains("CC-IT - Tecnología"));
        assert!(html.contains("PROV3-PROD001"));
    }

    #[test]
    fn document_serializes_with_company_block() {
        let company = CompanyConfig {
            name: "Comercial Prueba SpA".into(),
            ..CompanyConfig::default()
        };
        let doc = OrderDocument::from_detail(&detail(Currency::Clp), &company);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["company"]["name"], "Comercial Prueba SpA");
        assert_eq!(json["order_number"], "AIL-2025-0007");
    }

    #[test]
    fn disposition_header() {
        assert_eq!(
            Disposition::Inline.header_value("a.pdf"),
            "inline; filename=\"a.pdf\""
        );
        assert_eq!(Disposition::default(), Disposition::Attachment);
    }

    #[tokio::test]
    async fn non_pdf_output_is_rejected() {
        let renderer = StaticPdfRenderer::new(b"<html>".to_vec());
        assert!(matches!(
            renderer.render("<p>x</p>").await,
            Err(ServiceError::RenderError(_))
        ));
        let renderer = StaticPdfRenderer::new(b"%PDF-1.7\n%%EOF".to_vec());
        assert!(renderer.render("<p>x</p>").await.is_ok());
    }

    #[tokio::test]
    async fn missing_browser_is_a_render_error() {
        let renderer = ChromiumRenderer::new(
            "/nonexistent/chromium-for-tests",
            1,
            Duration::from_secs(5),
        );
        assert!(matches!(
            renderer.render("<p>x</p>").await,
            Err(ServiceError::RenderError(_))
        ));
    }
}
