use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bedboard_core::config::core_config_from_env;
use bedboard_core::inventory::BedInventory;
use bedboard_core::{
    Admission, AdmissionId, AdmissionStatus, AdmitRequest, BedBoardService, BedId, BedView,
    DayKey, Department, PatientId,
};

#[derive(Parser)]
#[command(name = "bedboard")]
#[command(about = "Bed board operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any beds from an inventory file that are missing from the store
    Seed {
        /// Path to the YAML bed inventory
        inventory: PathBuf,
    },
    /// Write the current bed inventory as YAML
    ExportInventory,
    /// List all beds
    Beds,
    /// Show one bed
    Bed {
        /// Bed identifier
        bed_id: String,
    },
    /// Admit a patient to a vacant bed
    Admit {
        /// Bed identifier
        bed_id: String,
        /// Patient identifier
        patient_id: String,
        /// Admitting department
        department: String,
        /// Admission time (RFC 3339, default now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Discharge the patient occupying a bed
    Discharge {
        /// Bed identifier
        bed_id: String,
        /// Discharge time (RFC 3339, default now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Record a clinical form flag for the bed's current admission
    Form {
        /// Bed identifier
        bed_id: String,
        /// Form key, e.g. admission_consent
        form_key: String,
        /// Clear the flag instead of setting it
        #[arg(long)]
        not_submitted: bool,
        /// JSON payload stored with the flag
        #[arg(long)]
        payload: Option<String>,
    },
    /// Start the TAT countdown
    TatStart {
        /// Bed identifier
        bed_id: String,
    },
    /// Stop the TAT countdown
    TatStop {
        /// Bed identifier
        bed_id: String,
    },
    /// List admissions, newest first
    Admissions {
        /// ADMITTED, DISCHARGED or ROLLED_BACK
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one admission
    Admission {
        /// Admission id (32 lowercase hex)
        admission_id: String,
    },
    /// Cross-check occupied beds against admission records
    Check,
    /// Show the admission counter for a day
    Counter {
        /// Day key (YYYYMMDD)
        day_key: String,
    },
}

fn parse_at(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|parsed| parsed.with_timezone(&Utc))
                .with_context(|| format!("'{v}' is not an RFC 3339 timestamp"))
        })
        .transpose()
}

fn print_bed(view: &BedView) {
    let bed = &view.bed;
    let occupant = match (bed.occupancy.patient_id(), bed.active_admission_id()) {
        (Some(patient), Some(admission)) => format!("{patient} (admission {admission})"),
        _ => "-".to_string(),
    };
    println!(
        "{:<10} {:<10} {:<16} {:<9} {:<40} TAT {} {}s left, rev {}",
        bed.bed_id,
        bed.bed_number,
        bed.room.room_type,
        bed.status(),
        occupant,
        view.tat.status,
        view.tat.remaining_secs,
        bed.revision
    );
    for (key, entry) in &bed.forms {
        println!(
            "    {key}: {}",
            if entry.submitted { "submitted" } else { "not submitted" }
        );
    }
}

fn print_admission(admission: &Admission) {
    println!(
        "{} {} patient {} bed {} ({}) {} admitted {}{}",
        admission.number,
        admission.id,
        admission.patient_id,
        admission.bed_id,
        admission.department,
        admission.status,
        admission.admitted_at,
        admission
            .discharged_at
            .map(|at| format!(", discharged {at}"))
            .unwrap_or_default()
    );
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bedboard=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("No command given. Use --help to list commands.");
        return Ok(());
    };

    let config = core_config_from_env().context("invalid BEDBOARD_* configuration")?;
    let service = BedBoardService::open(config).context("failed to open bed store")?;

    match command {
        Commands::Seed { inventory } => {
            let beds = BedInventory::load(&inventory)?;
            let report = service.seed_inventory(beds)?;
            println!(
                "Seeded {} bed(s), {} already present",
                report.created.len(),
                report.skipped.len()
            );
        }
        Commands::ExportInventory => {
            let beds: Vec<_> = service
                .list_beds()?
                .into_iter()
                .map(|view| view.bed)
                .collect();
            print!("{}", BedInventory::render(&beds)?);
        }
        Commands::Beds => {
            let beds = service.list_beds()?;
            if beds.is_empty() {
                println!("No beds found.");
            }
            for view in &beds {
                print_bed(view);
            }
        }
        Commands::Bed { bed_id } => {
            print_bed(&service.get_bed(&BedId::parse(&bed_id)?)?);
        }
        Commands::Admit {
            bed_id,
            patient_id,
            department,
            at,
        } => {
            let admission = service.admit(AdmitRequest {
                bed_id: BedId::parse(&bed_id)?,
                patient_id: PatientId::parse(&patient_id)?,
                department: Department::parse(&department)?,
                admitted_at: parse_at(at)?,
            })?;
            println!("Admitted with admission number {}", admission.number);
            print_admission(&admission);
        }
        Commands::Discharge { bed_id, at } => {
            let admission = service.discharge(&BedId::parse(&bed_id)?, parse_at(at)?)?;
            println!("Discharged {}", admission.number);
        }
        Commands::Form {
            bed_id,
            form_key,
            not_submitted,
            payload,
        } => {
            let payload = payload
                .map(|raw| serde_json::from_str(&raw).context("payload must be valid JSON"))
                .transpose()?;
            let view = service.update_bed_form_flag(
                &BedId::parse(&bed_id)?,
                &form_key,
                !not_submitted,
                payload,
            )?;
            print_bed(&view);
        }
        Commands::TatStart { bed_id } => {
            print_bed(&service.start_tat(&BedId::parse(&bed_id)?)?);
        }
        Commands::TatStop { bed_id } => {
            print_bed(&service.stop_tat(&BedId::parse(&bed_id)?)?);
        }
        Commands::Admissions { status } => {
            let status = status.as_deref().map(AdmissionStatus::parse).transpose()?;
            let admissions = service.list_admissions(status)?;
            if admissions.is_empty() {
                println!("No admissions found.");
            }
            for admission in &admissions {
                print_admission(admission);
            }
        }
        Commands::Admission { admission_id } => {
            print_admission(&service.get_admission(AdmissionId::parse(&admission_id)?)?);
        }
        Commands::Check => {
            let report = service.check_consistency()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_consistent() {
                anyhow::bail!(
                    "{} consistency issue(s) need reconciliation",
                    report.issues.len()
                );
            }
        }
        Commands::Counter { day_key } => {
            let day_key = DayKey::parse(&day_key)?;
            println!(
                "{}: {}",
                day_key,
                service.current_admission_counter(day_key)?
            );
        }
    }

    service.flush()?;
    Ok(())
}
