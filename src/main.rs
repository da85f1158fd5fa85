use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use clinic_portal::api::{ApiClient, AppointmentScope, ClinicApi, PaymentScope};
use clinic_portal::config;
use clinic_portal::model::{AppointmentStatus, PaymentMethod, Role, User};
use clinic_portal::notice::{NoticeLevel, NoticeQueue};
use clinic_portal::payment_flow::PaymentModal;
use clinic_portal::reconcile::{available_actions, Reconciler};
use clinic_portal::session::{SessionStore, TemporarySession, TemporarySessionStore};
use clinic_portal::store::{AppointmentStore, NotificationStore, PaymentStore, Refreshable};

#[derive(Debug, Parser)]
#[command(author, version, about = "Patient, doctor and admin portal for the clinic backend")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Portal to sign into: patient, doctor or admin
    #[arg(long, default_value = "patient")]
    portal: Role,

    /// Log in with these credentials instead of reusing the current session
    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an example config file and exit
    PrintConfigExample,
    /// Show who the backend thinks we are
    Verify,
    /// List appointments
    Appointments {
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// List the inbox with the actions each notification offers
    Notifications,
    /// Apply a status to the appointment behind a notification and mark it read
    Resolve {
        #[arg(long)]
        notification: String,
        #[arg(long)]
        status: AppointmentStatus,
        /// Defaults to the appointment referenced by the notification
        #[arg(long)]
        appointment: Option<String>,
    },
    MarkAllRead,
    DeleteNotification {
        id: String,
    },
    /// Record a payment, or edit one with --edit
    Pay {
        #[arg(long)]
        appointment: String,
        #[arg(long)]
        method: PaymentMethod,
        #[arg(long, conflicts_with = "full")]
        amount: Option<String>,
        /// Pay the whole outstanding balance
        #[arg(long)]
        full: bool,
        #[arg(long)]
        notes: Option<String>,
        /// Payment id to edit
        #[arg(long)]
        edit: Option<String>,
    },
    /// Start a guest (temporary) patient session
    GuestLogin {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::PrintConfigExample = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(args.config.as_path()))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let notices = Arc::new(NoticeQueue::new());
    let result = run(&args, &cfg, notices.clone()).await;

    for notice in notices.drain() {
        let tag = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        println!("[{}] {}", tag, notice.text);
    }
    result
}

async fn run(args: &Args, cfg: &config::Config, notices: Arc<NoticeQueue>) -> Result<()> {
    if let Command::GuestLogin { first_name, last_name, email, phone } = &args.command {
        let store = TemporarySessionStore::new(
            &cfg.app.resolved_data_dir(),
            cfg.session.temporary_ttl_hours,
        );
        let session = TemporarySession::new(first_name, last_name, email, phone);
        store.save(&session).await?;
        let expires = session.login_time + Duration::hours(cfg.session.temporary_ttl_hours as i64);
        println!("guest session for {} valid until {}", session.full_name(), expires);
        return Ok(());
    }

    let api: Arc<dyn ClinicApi> = Arc::new(ApiClient::from_config(cfg)?);
    let session = SessionStore::new(api.clone(), notices.clone());
    let user = authenticate(args, &session).await?;
    info!(username = %user.username, role = %user.role, "session ready");
    let user_id = user.id.clone().unwrap_or_else(|| user.username.clone());

    match &args.command {
        Command::PrintConfigExample | Command::GuestLogin { .. } => Ok(()),
        Command::Verify => {
            println!("{} ({})", user.username, user.role);
            Ok(())
        }
        Command::Appointments { patient, doctor, from, to } => {
            let scope = match (patient, doctor) {
                (Some(p), _) => AppointmentScope::Patient(p.clone()),
                (None, Some(d)) => {
                    let today = Utc::now().date_naive();
                    AppointmentScope::Doctor {
                        doctor: d.clone(),
                        start: from.unwrap_or(today),
                        end: to.unwrap_or(today + Duration::days(30)),
                    }
                }
                (None, None) => default_scope(&user, &user_id),
            };
            let store = AppointmentStore::new(api.clone(), scope);
            store.refresh_appointments().await?;
            for a in store.appointments().await {
                println!(
                    "{}  {} {}  {:<10} {:<12} {}  paid {:.2}/{:.2}",
                    a.id,
                    a.date,
                    a.time_slot,
                    a.status,
                    a.type_label(),
                    a.doctor,
                    a.total_paid,
                    a.price
                );
            }
            Ok(())
        }
        Command::Notifications => {
            let store = NotificationStore::new(api.clone(), user_id.clone());
            store.refresh_notifications().await?;
            for n in store.notifications().await {
                let actions: Vec<&str> = available_actions(&n, None)
                    .iter()
                    .map(|a| a.label())
                    .collect();
                println!(
                    "{} {} {}  {}{}",
                    if n.is_read { " " } else { "*" },
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.id,
                    n.message,
                    if actions.is_empty() {
                        String::new()
                    } else {
                        format!("  [{}]", actions.join(" | "))
                    }
                );
            }
            println!("{} unread", store.unread_count().await);
            Ok(())
        }
        Command::Resolve { notification, status, appointment } => {
            let appointments = Arc::new(AppointmentStore::new(
                api.clone(),
                default_scope(&user, &user_id),
            ));
            let inbox = Arc::new(NotificationStore::new(api.clone(), user_id.clone()));
            let appointment_id = match appointment {
                Some(id) => id.clone(),
                None => {
                    inbox.refresh_notifications().await?;
                    inbox
                        .get(notification)
                        .await
                        .and_then(|n| n.appointment_id().map(str::to_string))
                        .ok_or_else(|| {
                            anyhow!("notification {} references no appointment", notification)
                        })?
                }
            };
            let reconciler =
                Reconciler::new(appointments.clone(), inbox.clone(), notices.clone(), user.role);
            let resolution = reconciler
                .resolve_notification_action(&appointment_id, *status, notification)
                .await?;
            if let Some(a) = appointments.get(&appointment_id).await {
                println!("{} is now {}", a.id, a.status);
            }
            info!(?resolution, "resolved");
            Ok(())
        }
        Command::MarkAllRead => {
            let inbox = NotificationStore::new(api.clone(), user_id.clone());
            inbox.mark_all_as_read().await?;
            println!("all notifications marked read");
            Ok(())
        }
        Command::DeleteNotification { id } => {
            let inbox = NotificationStore::new(api.clone(), user_id.clone());
            inbox.delete_notification(id).await?;
            println!("deleted {}", id);
            Ok(())
        }
        Command::Pay { appointment, method, amount, full, notes, edit } => {
            let appointments = AppointmentStore::new(api.clone(), default_scope(&user, &user_id));
            appointments.refresh_appointments().await?;
            let appt = appointments
                .get(appointment)
                .await
                .ok_or_else(|| anyhow!("appointment {} not found", appointment))?;

            let payments = PaymentStore::new(
                api.clone(),
                Some(PaymentScope::Appointment(appt.id.clone())),
            );
            let existing = match edit {
                Some(id) => {
                    payments.refresh_payments().await?;
                    let found = payments.get(id).await;
                    Some(found.ok_or_else(|| anyhow!("payment {} not found", id))?)
                }
                None => None,
            };
            let mut modal = PaymentModal::open(Some(appt), existing.as_ref());
            modal.draft.method = Some(*method);
            if *full {
                modal.pay_in_full();
            } else if let Some(amount) = amount {
                modal.draft.amount = amount.clone();
            }
            if let Some(notes) = notes {
                modal.draft.notes = notes.clone();
            }
            let refresh: [&dyn Refreshable; 2] = [&appointments, &payments];
            let payment = modal.submit(&payments, &refresh, notices.as_ref()).await?;
            println!(
                "{} {:.2} {} ({})",
                payment.id, payment.amount, payment.method, payment.transaction_id
            );
            Ok(())
        }
    }
}

async fn authenticate(args: &Args, session: &SessionStore) -> Result<User> {
    match (&args.username, &args.password) {
        (Some(username), Some(password)) => {
            Ok(session.login(args.portal, username, password).await?)
        }
        (Some(_), None) | (None, Some(_)) => Err(anyhow!("--username and --password go together")),
        (None, None) => {
            session.verify().await?;
            Ok(session.require(args.portal).await?)
        }
    }
}

fn default_scope(user: &User, user_id: &str) -> AppointmentScope {
    match user.role {
        Role::Patient => AppointmentScope::Patient(user_id.to_string()),
        Role::Doctor => {
            let today = Utc::now().date_naive();
            AppointmentScope::Doctor {
                doctor: user.name.clone().unwrap_or_else(|| user.username.clone()),
                start: today - Duration::days(30),
                end: today + Duration::days(90),
            }
        }
        Role::Admin => AppointmentScope::All,
    }
}
