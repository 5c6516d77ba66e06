use std::{process, sync::Arc};

use caseflow::{
    application::{
        api::CasesApi,
        client::CaseClient,
        error::AppError,
        policy::{case_key, cases_key},
    },
    cache::{CacheConfig, ServiceError},
    config::{self, Command, DemoArgs, ListArgs, SetStatusArgs, Settings, ShowArgs},
    domain::{
        cases::UpdateStatusPayload,
        entities::{CaseRecord, CaseSummary},
        types::CaseStatus,
    },
    infra::{
        error::InfraError,
        mock::{MockBehavior, MockCasesApi},
        telemetry,
        timeout::TimeoutApi,
    },
};
use time::{OffsetDateTime, macros::format_description};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const DEMO_MIN_CASES: usize = 3;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    eprintln!("error: {}", error.presentation_message());
    if let Some(fields) = error.field_errors() {
        for (field, message) in fields {
            eprintln!("  {field}: {message}");
        }
    }

    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let command = cli_args
        .command
        .unwrap_or(Command::List(ListArgs::default()));
    info!(command = ?command, "caseflow starting");

    match command {
        Command::List(args) => {
            let (client, _) = build_client(&settings, MockBehavior::from(&settings.service), None);
            run_list(&client, args).await
        }
        Command::Show(args) => {
            let (client, _) = build_client(&settings, MockBehavior::from(&settings.service), None);
            run_show(&client, args).await
        }
        Command::SetStatus(args) => {
            let (client, _) = build_client(&settings, MockBehavior::from(&settings.service), None);
            run_set_status(&client, args).await
        }
        Command::Demo(args) => run_demo(&settings, args).await,
    }
}

fn build_client(
    settings: &Settings,
    behavior: MockBehavior,
    rng_seed: Option<u64>,
) -> (CaseClient, Arc<MockCasesApi>) {
    let mut service = MockCasesApi::seeded(settings.service.seed_count, behavior);
    if let Some(seed) = rng_seed {
        service = service.with_rng_seed(seed);
    }
    let service = Arc::new(service);

    let api: Arc<dyn CasesApi> = Arc::new(TimeoutApi::new(
        Arc::clone(&service),
        settings.service.request_timeout,
    ));
    let client = CaseClient::new(api, CacheConfig::from(&settings.cache));
    (client, service)
}

async fn run_list(client: &CaseClient, args: ListArgs) -> Result<(), AppError> {
    let cases = client.fetch_list().await?;
    if args.json {
        print_json(&cases)
    } else {
        print_list(&cases)
    }
}

async fn run_show(client: &CaseClient, args: ShowArgs) -> Result<(), AppError> {
    let case = client.fetch_detail(&args.id).await?;
    if args.json {
        print_json(&case)
    } else {
        print_case(&case)
    }
}

async fn run_set_status(client: &CaseClient, args: SetStatusArgs) -> Result<(), AppError> {
    tokio::try_join!(client.fetch_list(), client.fetch_detail(&args.id))?;

    let mut payload = UpdateStatusPayload::new(args.status);
    if let Some(reason) = args.reason {
        payload = payload.with_reason(reason);
    }

    let handle = client.update_status(&args.id, payload).await?;
    print_cached_state(client, &args.id, "optimistic");

    match handle.outcome().await {
        Ok(record) => {
            print_cached_state(client, &args.id, "committed");
            println!("{} is now {}", record.id, record.status.display_name());
            Ok(())
        }
        Err(err) => {
            print_cached_state(client, &args.id, "rolled back");
            Err(err.into())
        }
    }
}

async fn run_demo(settings: &Settings, args: DemoArgs) -> Result<(), AppError> {
    // Only scripted failures; random ones would make the walkthrough unpredictable.
    let behavior = MockBehavior {
        failure_rate: 0.0,
        ..MockBehavior::from(&settings.service)
    };
    let mut settings = settings.clone();
    settings.service.seed_count = settings.service.seed_count.max(DEMO_MIN_CASES);
    let (client, service) = build_client(&settings, behavior, args.seed);

    println!("== Loading cases");
    let cases = client.fetch_list().await?;
    print_list(&cases)?;

    println!();
    println!("== Optimistic update that commits");
    demo_update(&client, "case-1", UpdateStatusPayload::new(CaseStatus::Approved)).await?;

    println!();
    println!("== Optimistic update that rolls back");
    service.fail_next_update(ServiceError::server(500, "simulated outage"));
    demo_update(&client, "case-2", UpdateStatusPayload::new(CaseStatus::Approved)).await?;

    println!();
    println!("== Guarded request never reaches the service");
    let calls_before = service.update_calls();
    let rejected = UpdateStatusPayload::new(CaseStatus::Rejected).with_reason("too short");
    match client.try_update_status("case-3", rejected) {
        Ok(handle) => {
            let _ = handle.outcome().await;
            println!("unexpected: request was submitted");
        }
        Err(err) => {
            println!("refused: {}", err.presentation_message());
            if let Some(fields) = err.field_errors() {
                for (field, message) in fields {
                    println!("  {field}: {message}");
                }
            }
        }
    }
    println!(
        "service update calls: before={calls_before} after={}",
        service.update_calls()
    );

    println!();
    println!("== Settled queries are stale until refetched");
    let queries = client.engine().queries();
    println!(
        "list stale={} case-1 stale={}",
        queries.is_stale(&cases_key()),
        queries.is_stale(&case_key("case-1"))
    );
    let refreshed = client.fetch_list().await?;
    print_list(&refreshed)?;

    Ok(())
}

async fn demo_update(
    client: &CaseClient,
    id: &str,
    payload: UpdateStatusPayload,
) -> Result<(), AppError> {
    client.fetch_detail(id).await?;
    print_cached_state(client, id, "before");

    let target = payload.status;
    let handle = client.try_update_status(id, payload)?;
    println!("requested {id} -> {}", target.display_name());
    print_cached_state(client, id, "optimistic");

    let mut committed = false;
    handle
        .on_settled(
            |record: CaseRecord| {
                committed = true;
                println!("service accepted: {} is {}", record.id, record.status);
            },
            |err: ServiceError| println!("service failed: {err}"),
        )
        .await;

    let label = if committed {
        "committed"
    } else {
        "rolled back"
    };
    print_cached_state(client, id, label);
    Ok(())
}

fn print_cached_state(client: &CaseClient, id: &str, label: &str) {
    let detail = client
        .cached_case(id)
        .map(|case| case.status.to_string())
        .unwrap_or_else(|| "-".to_string());
    let listed = client
        .cached_list()
        .and_then(|list| list.into_iter().find(|summary| summary.id == id))
        .map(|summary| summary.status.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("  {label:<12} detail={detail:<10} list={listed}");
}

fn print_list(cases: &[CaseSummary]) -> Result<(), AppError> {
    println!("{:<10} {:<10} {:<12} NAME", "ID", "STATUS", "CREATED");
    for case in cases {
        println!(
            "{:<10} {:<10} {:<12} {}",
            case.id,
            case.status.as_str(),
            format_date(case.created_at)?,
            case.name
        );
    }
    Ok(())
}

fn print_case(case: &CaseRecord) -> Result<(), AppError> {
    println!("id:       {}", case.id);
    println!("name:     {}", case.name);
    println!("status:   {}", case.status.display_name());
    println!("created:  {}", format_date(case.created_at)?);
    match case.notes.as_deref() {
        Some(notes) if !notes.is_empty() => println!("notes:    {notes}"),
        _ => println!("notes:    -"),
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{rendered}");
    Ok(())
}

fn format_date(value: OffsetDateTime) -> Result<String, AppError> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| InfraError::from(err).into())
}
