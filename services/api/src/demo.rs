use crate::infra::{InMemoryOutbox, SteppedClock};
use chrono::Utc;
use clap::Args;
use review_desk::config::{AppConfig, ReviewConfig};
use review_desk::error::AppError;
use review_desk::telemetry;
use review_desk::workflows::intake::{ApplicantDirectory, IntakeImportError, SpreadsheetImporter};
use review_desk::workflows::review::{
    ApplicantRef, Application, ApproverRef, ReviewMessageRef, ReviewService, TracingNotifier,
    VoteDecision,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// Spreadsheet export (CSV) with one application per row
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Optional member export (`username,id`) used to resolve applicants
    #[arg(long)]
    pub(crate) members: Option<PathBuf>,
    /// Kind assigned to rows without an application type column
    #[arg(long)]
    pub(crate) default_kind: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Votes required to finalize an application. Defaults to the configured quorum.
    #[arg(long)]
    pub(crate) quorum: Option<usize>,
    /// Print the rendered notifications as JSON.
    #[arg(long)]
    pub(crate) show_notifications: bool,
}

pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let ImportArgs {
        csv,
        members,
        default_kind,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let directory = match members {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            ApplicantDirectory::from_csv_reader(file).map_err(IntakeImportError::from)?
        }
        None => ApplicantDirectory::passthrough(),
    };
    let mut importer = SpreadsheetImporter::new(directory);
    if let Some(kind) = default_kind {
        importer = importer.with_default_kind(kind);
    }

    let notifier = Arc::new(TracingNotifier::new(config.review.features.logging));
    let service = ReviewService::new(&config.review, notifier).with_intake(importer);
    let export = std::fs::File::open(&csv)?;
    let summary = service.import_spreadsheet(export)?;

    println!("Imported {}", csv.display());
    println!(
        "- {} submitted | {} without a resolved applicant | {} duplicate rows skipped",
        summary.submitted.len(),
        summary.unresolved,
        summary.duplicates
    );
    println!("Pending queue (quorum {}):", service.quorum());
    for application in service.pending() {
        print_application(&application);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = ReviewConfig::from_env()?;
    if let Some(quorum) = args.quorum {
        config.quorum = quorum.max(1);
    }
    config.approvers.clear();

    let outbox = Arc::new(InMemoryOutbox::default());
    let clock = Arc::new(SteppedClock::new(Utc::now()));
    let service = ReviewService::with_clock(&config, outbox.clone(), clock.clone());
    let quorum = service.quorum();

    println!("Application review demo (quorum {})", quorum);

    println!("\nQuorum vote through reactions and replies");
    let tester = service.submit(
        "tester",
        ApplicantRef::resolved("member-1001"),
        "I have been playing since the first beta and keep a bug journal.",
    )?;
    let message = ReviewMessageRef(format!("review-{}", tester.id.0));
    service.link_review_message(tester.id, message.clone())?;
    print_application(&tester);

    for index in 0..quorum {
        let approver = ApproverRef(format!("mod-{}", index + 1));
        let outcome = if index % 2 == 0 {
            service.vote_via_reaction(&message, approver.clone(), "✅")?
        } else {
            service.vote_via_reply(&message, approver.clone(), "deny, needs more detail")?
        };
        println!("  {} -> {}", approver, describe(&outcome));
    }
    print_application(&service.get(tester.id)?);

    println!("\nDuplicate and late votes are absorbed");
    let repeat = service.vote_via_reaction(&message, ApproverRef("mod-1".into()), "👍")?;
    println!("  mod-1 again -> {}", describe(&repeat));
    let late = service.vote_via_reply(&message, ApproverRef("mod-99".into()), "approve")?;
    println!("  mod-99 after the decision -> {}", describe(&late));

    println!("\nExpiry with a split vote");
    let staff = service.submit("staff", None, "Applicant left no contact handle.")?;
    if quorum > 2 {
        service.cast_vote(staff.id, ApproverRef("mod-1".into()), VoteDecision::Approve)?;
        service.cast_vote(staff.id, ApproverRef("mod-2".into()), VoteDecision::Deny)?;
    }
    clock.advance(config.expiry_deadline + chrono::Duration::hours(1));
    let expired = service.sweep_expired();
    for outcome in &expired {
        println!("  {} {}", outcome.application_id, outcome.summary());
    }
    print_application(&service.get(staff.id)?);

    println!("\nNotifications");
    for notification in outbox.sent() {
        println!(
            "  - template={} -> {} ({} recipients)",
            notification.template,
            notification.application_id,
            notification.recipients.len()
        );
        if args.show_notifications {
            match serde_json::to_string_pretty(&notification) {
                Ok(json) => println!("{}", json),
                Err(err) => println!("    payload unavailable: {}", err),
            }
        }
    }

    Ok(())
}

fn print_application(application: &Application) {
    let view = application.view();
    let applicant = view
        .applicant
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unresolved".to_string());
    println!(
        "- {} [{}] {} | applicant {} | {} approve / {} deny{}",
        view.application_id,
        view.kind,
        view.status,
        applicant,
        view.approvals,
        view.denials,
        view.decided_by
            .as_ref()
            .map(|approver| format!(" | decided by {}", approver))
            .unwrap_or_default()
    );
}

fn describe(outcome: &review_desk::workflows::review::IngressOutcome) -> String {
    serde_json::to_string(outcome).unwrap_or_else(|err| format!("unprintable outcome: {err}"))
}
