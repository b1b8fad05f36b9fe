//! # belegwerk
//!
//! Ingestion and validation pipeline for EN 16931 electronic invoices.
//!
//! Accepts pure XML in the UBL 2.1 Invoice/CreditNote syntax, pure XML in the
//! UN/CEFACT Cross Industry Invoice (CII) syntax, and hybrid PDF/A-3 carriers
//! (ZUGFeRD, Factur-X) that embed a CII document. Each incoming document runs
//! through extraction → format classification → canonical mapping → structure
//! validation → semantic (Schematron) validation → arithmetic validation →
//! ERP business validation and ends in a terminal outcome (`VALID`, `INVALID`,
//! `MANUAL_REVIEW`, or `ERROR`) together with a structured report.
//!
//! All monetary values use [`rust_decimal::Decimal`] — never floating point.
//! The canonical types follow the EN 16931 semantic model.
//!
//! ## Crate layout
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`core`] | Canonical invoice model, country/currency tables, IBAN checks |
//! | [`extraction`] | Carrier routing, PDF attachment reader, XML classifier |
//! | [`mapping`] | CII and UBL mappers onto the canonical model |
//! | [`validation`] | Structure, semantic (KoSIT), arithmetic and business stages |
//! | [`erp`] | Read-only ERP adapter contract and Postgres implementation |
//! | [`report`] | Findings, steps and the aggregate validation report |
//! | [`processor`] | The per-transaction driver (claim, stages, retry discipline) |
//! | [`worker`] | Dispatcher and bounded worker pool |
//!
//! The worker binary (`belegwerk-worker`) wires configuration, connection
//! pools and blob storage together and runs the pool until shutdown.

pub mod config;
pub mod core;
pub mod erp;
pub mod error;
pub mod extraction;
pub mod mapping;
pub mod persistence;
pub mod processor;
pub mod report;
pub mod storage;
pub mod validation;
pub mod worker;
