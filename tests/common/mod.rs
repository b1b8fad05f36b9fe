//! Shared fixtures: invoice XML builders, a hybrid PDF builder, and
//! in-memory store implementations for driving the processor end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use belegwerk::erp::{
    ErpAdapter, ErpBankDetails, ErpError, ErpPurchaseOrder, ErpPurchaseOrderLine, ErpVendor,
};
use belegwerk::persistence::{
    InvoiceTransaction, MetadataStore, StoreError, TerminalOutcome, TransactionStatus,
};
use belegwerk::storage::{BlobStore, StorageError};

// ---------------------------------------------------------------------------
// XML fixtures
// ---------------------------------------------------------------------------

/// A UBL invoice matching the happy-path scenario; individual fields can be
/// overridden per test.
pub struct UblFixture {
    pub number: String,
    pub issue_date: String,
    pub currency: String,
    pub seller_vat: String,
    pub quantity: String,
    pub unit_price: String,
    pub line_net: String,
    pub tax_rate: String,
    pub tax_amount: String,
    pub tax_exclusive: String,
    pub tax_inclusive: String,
    pub payable: String,
    pub iban: Option<String>,
    pub po_reference: Option<String>,
    pub item_identifier: Option<String>,
}

impl Default for UblFixture {
    fn default() -> Self {
        Self {
            number: "R-TEST-2025-001".into(),
            issue_date: "2025-01-15".into(),
            currency: "EUR".into(),
            seller_vat: "DE123456789".into(),
            quantity: "1.0".into(),
            unit_price: "100.00".into(),
            line_net: "100.00".into(),
            tax_rate: "19".into(),
            tax_amount: "19.00".into(),
            tax_exclusive: "100.00".into(),
            tax_inclusive: "119.00".into(),
            payable: "119.00".into(),
            iban: Some("DE89370400440532013000".into()),
            po_reference: None,
            item_identifier: None,
        }
    }
}

impl UblFixture {
    pub fn to_xml(&self) -> String {
        let po = self
            .po_reference
            .as_deref()
            .map(|po| format!("<cac:OrderReference><cbc:ID>{po}</cbc:ID></cac:OrderReference>"))
            .unwrap_or_default();
        let payment = self
            .iban
            .as_deref()
            .map(|iban| {
                format!(
                    "<cac:PaymentMeans><cbc:PaymentMeansCode>58</cbc:PaymentMeansCode>\
                     <cac:PayeeFinancialAccount><cbc:ID>{iban}</cbc:ID></cac:PayeeFinancialAccount>\
                     </cac:PaymentMeans>"
                )
            })
            .unwrap_or_default();
        let item_id = self
            .item_identifier
            .as_deref()
            .map(|id| {
                format!(
                    "<cac:StandardItemIdentification><cbc:ID schemeID=\"0160\">{id}</cbc:ID>\
                     </cac:StandardItemIdentification>"
                )
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2"
         xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cbc:ID>{number}</cbc:ID>
  <cbc:IssueDate>{issue_date}</cbc:IssueDate>
  <cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>
  <cbc:DocumentCurrencyCode>{currency}</cbc:DocumentCurrencyCode>
  {po}
  <cac:AccountingSupplierParty>
    <cac:Party>
      <cac:PartyName><cbc:Name>ACME GmbH</cbc:Name></cac:PartyName>
      <cac:PostalAddress>
        <cbc:StreetName>Friedrichstraße 123</cbc:StreetName>
        <cbc:CityName>Berlin</cbc:CityName>
        <cbc:PostalZone>10115</cbc:PostalZone>
        <cac:Country><cbc:IdentificationCode>DE</cbc:IdentificationCode></cac:Country>
      </cac:PostalAddress>
      <cac:PartyTaxScheme>
        <cbc:CompanyID>{seller_vat}</cbc:CompanyID>
        <cac:TaxScheme><cbc:ID>VAT</cbc:ID></cac:TaxScheme>
      </cac:PartyTaxScheme>
    </cac:Party>
  </cac:AccountingSupplierParty>
  <cac:AccountingCustomerParty>
    <cac:Party>
      <cac:PartyName><cbc:Name>Kunde AG</cbc:Name></cac:PartyName>
      <cac:PostalAddress>
        <cbc:CityName>München</cbc:CityName>
        <cbc:PostalZone>80331</cbc:PostalZone>
        <cac:Country><cbc:IdentificationCode>DE</cbc:IdentificationCode></cac:Country>
      </cac:PostalAddress>
    </cac:Party>
  </cac:AccountingCustomerParty>
  {payment}
  <cac:TaxTotal>
    <cbc:TaxAmount currencyID="{currency}">{tax_amount}</cbc:TaxAmount>
    <cac:TaxSubtotal>
      <cbc:TaxableAmount currencyID="{currency}">{tax_exclusive}</cbc:TaxableAmount>
      <cbc:TaxAmount currencyID="{currency}">{tax_amount}</cbc:TaxAmount>
      <cac:TaxCategory>
        <cbc:ID>S</cbc:ID>
        <cbc:Percent>{tax_rate}</cbc:Percent>
        <cac:TaxScheme><cbc:ID>VAT</cbc:ID></cac:TaxScheme>
      </cac:TaxCategory>
    </cac:TaxSubtotal>
  </cac:TaxTotal>
  <cac:LegalMonetaryTotal>
    <cbc:LineExtensionAmount currencyID="{currency}">{line_net}</cbc:LineExtensionAmount>
    <cbc:TaxExclusiveAmount currencyID="{currency}">{tax_exclusive}</cbc:TaxExclusiveAmount>
    <cbc:TaxInclusiveAmount currencyID="{currency}">{tax_inclusive}</cbc:TaxInclusiveAmount>
    <cbc:PayableAmount currencyID="{currency}">{payable}</cbc:PayableAmount>
  </cac:LegalMonetaryTotal>
  <cac:InvoiceLine>
    <cbc:ID>1</cbc:ID>
    <cbc:InvoicedQuantity unitCode="C62">{quantity}</cbc:InvoicedQuantity>
    <cbc:LineExtensionAmount currencyID="{currency}">{line_net}</cbc:LineExtensionAmount>
    <cac:Item>
      <cbc:Name>Beratung</cbc:Name>
      {item_id}
      <cac:ClassifiedTaxCategory>
        <cbc:ID>S</cbc:ID>
        <cbc:Percent>{tax_rate}</cbc:Percent>
        <cac:TaxScheme><cbc:ID>VAT</cbc:ID></cac:TaxScheme>
      </cac:ClassifiedTaxCategory>
    </cac:Item>
    <cac:Price>
      <cbc:PriceAmount currencyID="{currency}">{unit_price}</cbc:PriceAmount>
    </cac:Price>
  </cac:InvoiceLine>
</Invoice>"#,
            number = self.number,
            issue_date = self.issue_date,
            currency = self.currency,
            seller_vat = self.seller_vat,
            quantity = self.quantity,
            unit_price = self.unit_price,
            line_net = self.line_net,
            tax_rate = self.tax_rate,
            tax_amount = self.tax_amount,
            tax_exclusive = self.tax_exclusive,
            tax_inclusive = self.tax_inclusive,
            payable = self.payable,
            po = po,
            payment = payment,
            item_id = item_id,
        )
    }
}

/// A CII invoice with the same economic content as the UBL fixture.
pub struct CiiFixture {
    pub number: String,
    /// `None` drops the IssueDateTime element entirely.
    pub issue_date: Option<String>,
    pub currency: String,
    pub seller_vat: String,
    pub iban: Option<String>,
    pub po_reference: Option<String>,
    pub item_identifier: Option<String>,
}

impl Default for CiiFixture {
    fn default() -> Self {
        Self {
            number: "R-TEST-2025-001".into(),
            issue_date: Some("20250115".into()),
            currency: "EUR".into(),
            seller_vat: "DE123456789".into(),
            iban: Some("DE89370400440532013000".into()),
            po_reference: None,
            item_identifier: None,
        }
    }
}

impl CiiFixture {
    pub fn to_xml(&self) -> String {
        let issue = self
            .issue_date
            .as_deref()
            .map(|d| {
                format!(
                    "<ram:IssueDateTime><udt:DateTimeString format=\"102\">{d}</udt:DateTimeString></ram:IssueDateTime>"
                )
            })
            .unwrap_or_default();
        let po = self
            .po_reference
            .as_deref()
            .map(|po| {
                format!(
                    "<ram:BuyerOrderReferencedDocument><ram:IssuerAssignedID>{po}</ram:IssuerAssignedID></ram:BuyerOrderReferencedDocument>"
                )
            })
            .unwrap_or_default();
        let payment = self
            .iban
            .as_deref()
            .map(|iban| {
                format!(
                    "<ram:SpecifiedTradeSettlementPaymentMeans><ram:TypeCode>58</ram:TypeCode>\
                     <ram:PayeePartyCreditorFinancialAccount><ram:IBANID>{iban}</ram:IBANID>\
                     </ram:PayeePartyCreditorFinancialAccount></ram:SpecifiedTradeSettlementPaymentMeans>"
                )
            })
            .unwrap_or_default();
        let global_id = self
            .item_identifier
            .as_deref()
            .map(|id| format!("<ram:GlobalID schemeID=\"0160\">{id}</ram:GlobalID>"))
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rsm:CrossIndustryInvoice
    xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"
    xmlns:ram="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
    xmlns:udt="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100">
  <rsm:ExchangedDocumentContext/>
  <rsm:ExchangedDocument>
    <ram:ID>{number}</ram:ID>
    <ram:TypeCode>380</ram:TypeCode>
    {issue}
  </rsm:ExchangedDocument>
  <rsm:SupplyChainTradeTransaction>
    <ram:IncludedSupplyChainTradeLineItem>
      <ram:AssociatedDocumentLineDocument><ram:LineID>1</ram:LineID></ram:AssociatedDocumentLineDocument>
      <ram:SpecifiedTradeProduct>
        {global_id}
        <ram:Name>Beratung</ram:Name>
      </ram:SpecifiedTradeProduct>
      <ram:SpecifiedLineTradeAgreement>
        <ram:NetPriceProductTradePrice><ram:ChargeAmount>100.00</ram:ChargeAmount></ram:NetPriceProductTradePrice>
      </ram:SpecifiedLineTradeAgreement>
      <ram:SpecifiedLineTradeDelivery>
        <ram:BilledQuantity unitCode="C62">1.0</ram:BilledQuantity>
      </ram:SpecifiedLineTradeDelivery>
      <ram:SpecifiedLineTradeSettlement>
        <ram:ApplicableTradeTax>
          <ram:TypeCode>VAT</ram:TypeCode>
          <ram:CategoryCode>S</ram:CategoryCode>
          <ram:RateApplicablePercent>19</ram:RateApplicablePercent>
        </ram:ApplicableTradeTax>
        <ram:SpecifiedTradeSettlementLineMonetarySummation>
          <ram:LineTotalAmount>100.00</ram:LineTotalAmount>
        </ram:SpecifiedTradeSettlementLineMonetarySummation>
      </ram:SpecifiedLineTradeSettlement>
    </ram:IncludedSupplyChainTradeLineItem>
    <ram:ApplicableHeaderTradeAgreement>
      <ram:SellerTradeParty>
        <ram:Name>ACME GmbH</ram:Name>
        <ram:PostalTradeAddress>
          <ram:PostcodeCode>10115</ram:PostcodeCode>
          <ram:LineOne>Friedrichstraße 123</ram:LineOne>
          <ram:CityName>Berlin</ram:CityName>
          <ram:CountryID>DE</ram:CountryID>
        </ram:PostalTradeAddress>
        <ram:SpecifiedTaxRegistration><ram:ID schemeID="VA">{seller_vat}</ram:ID></ram:SpecifiedTaxRegistration>
      </ram:SellerTradeParty>
      <ram:BuyerTradeParty>
        <ram:Name>Kunde AG</ram:Name>
        <ram:PostalTradeAddress>
          <ram:PostcodeCode>80331</ram:PostcodeCode>
          <ram:CityName>München</ram:CityName>
          <ram:CountryID>DE</ram:CountryID>
        </ram:PostalTradeAddress>
      </ram:BuyerTradeParty>
      {po}
    </ram:ApplicableHeaderTradeAgreement>
    <ram:ApplicableHeaderTradeDelivery/>
    <ram:ApplicableHeaderTradeSettlement>
      <ram:InvoiceCurrencyCode>{currency}</ram:InvoiceCurrencyCode>
      {payment}
      <ram:ApplicableTradeTax>
        <ram:CalculatedAmount>19.00</ram:CalculatedAmount>
        <ram:TypeCode>VAT</ram:TypeCode>
        <ram:BasisAmount>100.00</ram:BasisAmount>
        <ram:CategoryCode>S</ram:CategoryCode>
        <ram:RateApplicablePercent>19</ram:RateApplicablePercent>
      </ram:ApplicableTradeTax>
      <ram:SpecifiedTradeSettlementHeaderMonetarySummation>
        <ram:LineTotalAmount>100.00</ram:LineTotalAmount>
        <ram:TaxBasisTotalAmount>100.00</ram:TaxBasisTotalAmount>
        <ram:TaxTotalAmount currencyID="{currency}">19.00</ram:TaxTotalAmount>
        <ram:GrandTotalAmount>119.00</ram:GrandTotalAmount>
        <ram:DuePayableAmount>119.00</ram:DuePayableAmount>
      </ram:SpecifiedTradeSettlementHeaderMonetarySummation>
    </ram:ApplicableHeaderTradeSettlement>
  </rsm:SupplyChainTradeTransaction>
</rsm:CrossIndustryInvoice>"#,
            number = self.number,
            issue = issue,
            currency = self.currency,
            seller_vat = self.seller_vat,
            po = po,
            payment = payment,
            global_id = global_id,
        )
    }
}

// ---------------------------------------------------------------------------
// PDF fixtures
// ---------------------------------------------------------------------------

/// A minimal one-page PDF without attachments.
pub fn minimal_pdf() -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let content = Stream::new(
        dictionary! {},
        b"BT /F1 12 Tf 100 700 Td (Invoice) Tj ET".to_vec(),
    );
    let content_id = doc.add_object(content);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Contents" => Object::Reference(content_id),
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("save minimal PDF");
    output
}

/// Embed invoice XML into a PDF under the given attachment filename, wiring
/// both the EmbeddedFiles name tree and the catalogue /AF array.
pub fn pdf_with_attachment(filename: &str, xml: &[u8]) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let base = minimal_pdf();
    let mut doc = Document::load_mem(&base).expect("reload minimal PDF");

    let ef_stream = Stream::new(
        dictionary! {
            "Type" => "EmbeddedFile",
            "Subtype" => Object::Name(b"text#2Fxml".to_vec()),
            "Params" => dictionary! { "Size" => Object::Integer(xml.len() as i64) },
        },
        xml.to_vec(),
    )
    .with_compression(false);
    let ef_stream_id = doc.add_object(ef_stream);

    let filespec = dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal(filename),
        "UF" => Object::string_literal(filename),
        "AFRelationship" => Object::Name(b"Data".to_vec()),
        "EF" => dictionary! {
            "F" => Object::Reference(ef_stream_id),
            "UF" => Object::Reference(ef_stream_id),
        },
    };
    let filespec_id = doc.add_object(filespec);

    let name_tree = dictionary! {
        "Names" => Object::Array(vec![
            Object::string_literal(filename),
            Object::Reference(filespec_id),
        ]),
    };
    let name_tree_id = doc.add_object(name_tree);
    let names_id = doc.add_object(dictionary! {
        "EmbeddedFiles" => Object::Reference(name_tree_id),
    });

    let catalog = doc.catalog_mut().expect("catalog");
    catalog.set("Names", Object::Reference(names_id));
    catalog.set("AF", Object::Array(vec![Object::Reference(filespec_id)]));

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("save PDF with attachment");
    output
}

// ---------------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub transaction: InvoiceTransaction,
    pub outcome: Option<TerminalOutcome>,
    pub report_writes: u32,
    pub error_message: Option<String>,
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    rows: Mutex<HashMap<Uuid, StoredRow>>,
    pub logs: Mutex<Vec<(Uuid, String, String)>>,
}

impl MemoryMetadataStore {
    pub fn with_received(id: Uuid, raw_blob_uri: &str) -> Self {
        let store = Self::default();
        store.insert_received(id, raw_blob_uri);
        store
    }

    pub fn insert_received(&self, id: Uuid, raw_blob_uri: &str) {
        self.rows.lock().unwrap().insert(
            id,
            StoredRow {
                transaction: InvoiceTransaction {
                    id,
                    status: TransactionStatus::Received,
                    raw_blob_uri: raw_blob_uri.to_owned(),
                    processed_xml_uri: None,
                    content_type: None,
                    retry_count: 0,
                    received_at: Utc::now(),
                    next_attempt_at: None,
                },
                outcome: None,
                report_writes: 0,
                error_message: None,
            },
        );
    }

    pub fn row(&self, id: Uuid) -> StoredRow {
        self.rows.lock().unwrap().get(&id).expect("row").clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn load(&self, id: Uuid) -> Result<Option<InvoiceTransaction>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| r.transaction.clone()))
    }

    async fn claim(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(row)
                if matches!(
                    row.transaction.status,
                    TransactionStatus::Received | TransactionStatus::Error
                ) =>
            {
                row.transaction.status = TransactionStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, id: Uuid, outcome: &TerminalOutcome) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(StoreError("row missing".into()))?;
        if row.transaction.status != TransactionStatus::Processing {
            return Ok(());
        }
        row.transaction.status = outcome.status;
        row.transaction.processed_xml_uri = outcome.processed_xml_uri.clone();
        row.outcome = Some(outcome.clone());
        row.report_writes += 1;
        Ok(())
    }

    async fn release_for_retry(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(StoreError("row missing".into()))?;
        if row.transaction.status == TransactionStatus::Processing {
            row.transaction.status = TransactionStatus::Received;
            row.transaction.retry_count += 1;
            row.transaction.next_attempt_at = Some(next_attempt_at);
            row.error_message = Some(error.to_owned());
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(StoreError("row missing".into()))?;
        if row.transaction.status == TransactionStatus::Processing {
            row.transaction.status = TransactionStatus::Error;
            row.error_message = Some(error.to_owned());
        }
        Ok(())
    }

    async fn append_log(
        &self,
        id: Uuid,
        step_name: &str,
        step_status: &str,
        _message: &str,
    ) -> Result<(), StoreError> {
        self.logs
            .lock()
            .unwrap()
            .push((id, step_name.to_owned(), step_status.to_owned()));
        Ok(())
    }

    async fn due_transactions(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.transaction.status == TransactionStatus::Received)
            .map(|r| r.transaction.id)
            .take(limit as usize)
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn with_blob(uri: &str, bytes: &[u8]) -> Self {
        let store = Self::default();
        store
            .blobs
            .lock()
            .unwrap()
            .insert(uri.to_owned(), bytes.to_vec());
        store
    }

    pub fn blob(&self, uri: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(uri).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(uri.to_owned()))
    }

    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(uri.to_owned(), bytes.to_vec());
        Ok(())
    }
}

/// Blob store whose reads always fail; used to exercise the retry path.
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn get(&self, _uri: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::Io("storage endpoint unreachable".into()))
    }

    async fn put(&self, _uri: &str, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Io("storage endpoint unreachable".into()))
    }
}

/// Scriptable ERP double.
#[derive(Default)]
pub struct MockErp {
    pub vendor: Option<ErpVendor>,
    pub duplicate: bool,
    pub registered_ibans: Vec<String>,
    pub purchase_order: Option<ErpPurchaseOrder>,
}

impl MockErp {
    /// Vendor K-1001 with the happy-path IBAN registered.
    pub fn matching() -> Self {
        Self {
            vendor: Some(ErpVendor {
                vendor_id: "K-1001".into(),
                vat_id: Some("DE123456789".into()),
                active: true,
            }),
            duplicate: false,
            registered_ibans: vec!["DE89370400440532013000".into()],
            purchase_order: None,
        }
    }

    pub fn with_po(mut self, po: ErpPurchaseOrder) -> Self {
        self.purchase_order = Some(po);
        self
    }
}

/// Build a PO for vendor K-1001 with one line.
pub fn purchase_order(
    po_number: &str,
    total_net: Decimal,
    item: &str,
    ordered: Decimal,
    invoiced: Decimal,
) -> ErpPurchaseOrder {
    let mut lines = HashMap::new();
    lines.insert(
        item.to_owned(),
        ErpPurchaseOrderLine {
            item_identifier: item.to_owned(),
            quantity_ordered: ordered,
            quantity_invoiced: invoiced,
        },
    );
    ErpPurchaseOrder {
        po_number: po_number.to_owned(),
        vendor_id: "K-1001".into(),
        total_net,
        open_for_invoicing: true,
        lines,
    }
}

#[async_trait]
impl ErpAdapter for MockErp {
    async fn find_vendor_by_vat_id(&self, vat_id: &str) -> Result<Option<ErpVendor>, ErpError> {
        Ok(self
            .vendor
            .clone()
            .filter(|v| v.vat_id.as_deref() == Some(vat_id)))
    }

    async fn is_duplicate_invoice(
        &self,
        _vendor_id: &str,
        _invoice_number: &str,
    ) -> Result<bool, ErpError> {
        Ok(self.duplicate)
    }

    async fn get_vendor_bank_details(
        &self,
        _vendor_id: &str,
    ) -> Result<Vec<ErpBankDetails>, ErpError> {
        Ok(self
            .registered_ibans
            .iter()
            .map(|iban| ErpBankDetails { iban: iban.clone() })
            .collect())
    }

    async fn get_purchase_order(
        &self,
        po_number: &str,
        vendor_id: &str,
    ) -> Result<Option<ErpPurchaseOrder>, ErpError> {
        Ok(self
            .purchase_order
            .clone()
            .filter(|po| po.po_number == po_number && po.vendor_id == vendor_id))
    }
}
