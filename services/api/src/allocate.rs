use crate::cli::parse_strategy;
use crate::infra::{load_ledger, sample_ledger, InMemoryRequestStore, InMemoryTransport};
use chrono::Utc;
use clap::Args;
use donation_matcher::error::AppError;
use donation_matcher::workflows::donations::{
    format_currency, AllocationCoordinator, AllocationReport, AllocationSettings, DonationEvent,
    DonationId, OutboundMessage, PaymentMethod, Request, SelectionStrategy,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct AllocateArgs {
    /// Donation amount in whole dollars
    #[arg(long)]
    pub(crate) amount: u64,
    /// Comma-separated payment methods the donor can use (e.g. "Zelle,Venmo")
    #[arg(long, value_delimiter = ',', required = true, value_parser = parse_method)]
    pub(crate) methods: Vec<PaymentMethod>,
    /// Donor name used in the outbound text
    #[arg(long, default_value = "CLI donor")]
    pub(crate) name: String,
    /// Donor phone number
    #[arg(long, default_value = "+15555550100")]
    pub(crate) phone: String,
    /// Donation id recorded against each funded request (defaults to a timestamped id)
    #[arg(long)]
    pub(crate) donation_id: Option<String>,
    /// Selection strategy (weighted_lottery or sequential_exhaustion)
    #[arg(long, value_parser = parse_strategy)]
    pub(crate) strategy: Option<SelectionStrategy>,
    /// Seed the selection RNG for a reproducible run
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// JSON ledger of requests; a built-in sample ledger is used when omitted
    #[arg(long)]
    pub(crate) ledger: Option<PathBuf>,
}

fn parse_method(raw: &str) -> Result<PaymentMethod, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("payment method cannot be blank".to_string());
    }
    Ok(PaymentMethod::parse(trimmed))
}

pub(crate) async fn run_allocate(args: AllocateArgs) -> Result<(), AppError> {
    let ledger = match args.ledger.as_deref() {
        Some(path) => load_ledger(path)?,
        None => sample_ledger(),
    };

    let mut settings = AllocationSettings {
        sender_number: "+15555550000".to_string(),
        rng_seed: args.seed,
        ..AllocationSettings::default()
    };
    if let Some(strategy) = args.strategy {
        settings.strategy = strategy;
    }

    let store = Arc::new(InMemoryRequestStore::from_requests(ledger));
    let transport = Arc::new(InMemoryTransport::default());
    let coordinator = AllocationCoordinator::new(store.clone(), transport.clone(), settings);

    let event = DonationEvent {
        donation_id: DonationId(
            args.donation_id
                .unwrap_or_else(|| format!("cli-{}", Utc::now().timestamp_millis())),
        ),
        donor_name: args.name,
        amount: args.amount,
        payment_methods: args.methods,
        phone_number: args.phone,
    };

    let report = coordinator.allocate(&event).await?;
    print!(
        "{}",
        render_report(&report, &store.snapshot(), &transport.outbox())
    );
    for error in store.errors() {
        println!("  error at {}: {}", error.stage.label(), error.message);
    }
    Ok(())
}

pub(crate) fn render_report(
    report: &AllocationReport,
    ledger: &[Request],
    outbox: &[OutboundMessage],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Donation {} from {} ({})",
        report.donation_id, report.donor_name, report.strategy
    );

    if report.allocations.is_empty() {
        let _ = writeln!(out, "  No allocations made");
    }
    for allocation in &report.allocations {
        match (&allocation.destination, &allocation.failure) {
            (Some(destination), None) => {
                let _ = writeln!(
                    out,
                    "  {} -> {} via {}{}",
                    format_currency(allocation.amount),
                    allocation.request_name,
                    destination,
                    if allocation.funded { " (funded)" } else { "" }
                );
            }
            (_, Some(failure)) => {
                let _ = writeln!(
                    out,
                    "  {} -> {} failed [{}]: {}",
                    format_currency(allocation.amount),
                    allocation.request_name,
                    failure.kind(),
                    failure
                );
            }
            (None, None) => {
                let _ = writeln!(
                    out,
                    "  {} -> {}",
                    format_currency(allocation.amount),
                    allocation.request_name
                );
            }
        }
    }

    let _ = writeln!(out, "Leftover: {}", format_currency(report.leftover));
    let _ = writeln!(out, "Texts sent: {}", outbox.len());

    let _ = writeln!(out, "\nLedger:");
    for request in ledger {
        let _ = writeln!(
            out,
            "  {:<24} {:>8} raised of {:>8}  {}",
            request.name,
            format_currency(request.amount_raised()),
            format_currency(request.amount_to_raise),
            request.status().label()
        );
    }
    out
}
