use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// BG-0: The canonical invoice — the single normalised target of both the
/// CII and the UBL mapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalInvoice {
    /// BT-1: Invoice number.
    pub number: String,
    /// BT-2: Invoice issue date.
    pub issue_date: NaiveDate,
    /// BT-3: Document type derived from the UNTDID 1001 type code.
    pub document_type: DocumentType,
    /// BT-5: Invoice currency code (ISO 4217, e.g. "EUR").
    pub currency_code: String,
    /// BT-72: Actual delivery date.
    pub delivery_date: Option<NaiveDate>,
    /// BT-9: Payment due date.
    pub due_date: Option<NaiveDate>,
    /// BG-4: Seller.
    pub seller: Party,
    /// BG-7: Buyer.
    pub buyer: Party,
    /// BG-25: Invoice lines (at least one).
    pub lines: Vec<InvoiceLine>,
    /// BT-106: Sum of all line net amounts.
    pub line_extension_amount: Decimal,
    /// BT-107: Sum of document-level allowances.
    pub allowance_total_amount: Decimal,
    /// BT-108: Sum of document-level charges.
    pub charge_total_amount: Decimal,
    /// BT-109: Invoice total without VAT.
    pub tax_exclusive_amount: Decimal,
    /// BT-112: Invoice total with VAT.
    pub tax_inclusive_amount: Decimal,
    /// BT-113: Prepaid amount (defaults to zero).
    pub prepaid_amount: Decimal,
    /// BT-115: Amount due for payment.
    pub payable_amount: Decimal,
    /// BG-23: VAT breakdown per category/rate combination.
    pub tax_breakdown: Vec<TaxBreakdown>,
    /// BG-17: Payee bank accounts (credit transfer).
    pub payment_details: Vec<BankDetails>,
    /// BT-13: Purchase order reference.
    pub purchase_order_reference: Option<String>,
    /// BT-22: Free-text note.
    pub note: Option<String>,
}

impl CanonicalInvoice {
    /// Total VAT amount across all breakdown entries.
    pub fn total_tax_amount(&self) -> Decimal {
        self.tax_breakdown.iter().map(|b| b.tax_amount).sum()
    }
}

/// Document type derived from UNTDID 1001: 380 and 384 map to an invoice,
/// 381 to a credit note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Invoice,
    CreditNote,
}

impl DocumentType {
    /// Parse from a UNTDID 1001 numeric code.
    pub fn from_type_code(code: u16) -> Option<Self> {
        match code {
            380 | 384 => Some(Self::Invoice),
            381 => Some(Self::CreditNote),
            _ => None,
        }
    }
}

/// BG-4 / BG-7: Party (seller or buyer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// BT-27 / BT-44: Name.
    pub name: String,
    /// BT-31 / BT-48: VAT identifier (e.g. "DE123456789").
    pub vat_id: Option<String>,
    /// BT-32: Tax registration number (Steuernummer).
    pub tax_number: Option<String>,
    /// BG-5 / BG-8: Postal address.
    pub address: Address,
}

/// BG-5 / BG-8: Postal address. Only the country code is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// BT-35 / BT-50: Street + house number.
    pub street: Option<String>,
    /// BT-36 / BT-51: Additional address line.
    pub additional: Option<String>,
    /// BT-37 / BT-52: City.
    pub city: Option<String>,
    /// BT-38 / BT-53: Postal code.
    pub postal_code: Option<String>,
    /// BT-40 / BT-55: Country code (ISO 3166-1 alpha-2).
    pub country_code: String,
}

/// BG-25: Invoice line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// BT-126: Line identifier.
    pub id: String,
    /// BT-153: Item name.
    pub item_name: String,
    /// BT-154: Item description.
    pub item_description: Option<String>,
    /// BT-157/BT-155/BT-156: Item identifier (GTIN/EAN/HAN), used to join
    /// invoice lines to purchase-order lines.
    pub item_identifier: Option<String>,
    /// BT-129: Invoiced quantity.
    pub quantity: Decimal,
    /// BT-130: Unit of measure (UN/ECE Rec 20, "C62" = piece).
    pub unit_code: String,
    /// BT-146: Item net price per unit (already divided by any base quantity).
    pub unit_price: Decimal,
    /// BT-131: Line net amount.
    pub net_amount: Decimal,
    /// BT-151: Tax category for this line.
    pub tax_category: TaxCategory,
    /// BT-152: Tax rate percentage for this line.
    pub tax_rate: Decimal,
}

/// UNTDID 5305 — Tax category codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxCategory {
    /// S — Standard rate.
    StandardRate,
    /// Z — Zero rated.
    ZeroRated,
    /// E — Exempt from tax.
    Exempt,
    /// AE — Reverse charge.
    ReverseCharge,
    /// K — Intra-community supply.
    IntraCommunitySupply,
    /// G — Export (outside EU).
    Export,
    /// O — Not subject to VAT.
    NotSubjectToVat,
}

impl TaxCategory {
    /// UNTDID 5305 code letter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StandardRate => "S",
            Self::ZeroRated => "Z",
            Self::Exempt => "E",
            Self::ReverseCharge => "AE",
            Self::IntraCommunitySupply => "K",
            Self::Export => "G",
            Self::NotSubjectToVat => "O",
        }
    }

    /// Parse from a UNTDID 5305 code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::StandardRate),
            "Z" => Some(Self::ZeroRated),
            "E" => Some(Self::Exempt),
            "AE" => Some(Self::ReverseCharge),
            "K" => Some(Self::IntraCommunitySupply),
            "G" => Some(Self::Export),
            "O" => Some(Self::NotSubjectToVat),
            _ => None,
        }
    }

    /// Categories that may legitimately omit an explicit rate; the mappers
    /// default these to zero.
    pub fn rate_may_be_absent(&self) -> bool {
        matches!(
            self,
            Self::ZeroRated
                | Self::Exempt
                | Self::ReverseCharge
                | Self::IntraCommunitySupply
                | Self::Export
                | Self::NotSubjectToVat
        )
    }
}

/// BG-23: VAT breakdown per category/rate combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// BT-118: Tax category.
    pub category: TaxCategory,
    /// BT-119: Tax rate percentage.
    pub rate: Decimal,
    /// BT-116: Taxable amount (category base).
    pub taxable_amount: Decimal,
    /// BT-117: Tax amount.
    pub tax_amount: Decimal,
}

/// BG-17: Payee bank account. The IBAN is stored normalised (uppercase, no
/// spaces); checksum verification happens in [`crate::core::iban`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    /// BT-84: IBAN.
    pub iban: String,
    /// BT-86: BIC.
    pub bic: Option<String>,
}
