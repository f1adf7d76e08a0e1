use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use canvascore::Workflow;
use canvasruntime::{
    find_cycles, try_extract_dependencies, validate, RuntimeConfig, Schedule, WorkflowRuntime,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<WorkflowRuntime>,
}

/// Request body for dependency analysis
#[derive(Debug, Deserialize)]
struct DependenciesRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct DependenciesResponse {
    dependencies: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// Response for schedule preview
#[derive(Debug, Serialize)]
struct ScheduleResponse {
    #[serde(flatten)]
    schedule: Schedule,
    cycles: Vec<Vec<String>>,
    issues: Vec<canvasruntime::GraphIssue>,
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "canvasserver"
    }))
}

/// Execute a graph snapshot and return the run report. Events of the run
/// are published to every `/api/events` subscriber.
#[post("/api/run")]
async fn run_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();
    info!(
        "Executing workflow {} ({} nodes)",
        workflow.name.as_deref().unwrap_or("<unnamed>"),
        workflow.nodes.len()
    );

    let report = data.runtime.execute(&workflow).await;
    info!(
        "Workflow run {} finished: {}/{} nodes",
        report.execution_id,
        report.results.len(),
        report.sequence.len()
    );

    Ok(HttpResponse::Ok().json(report))
}

/// Preview the execution order without running anything
#[post("/api/schedule")]
async fn preview_schedule(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let workflow = workflow.into_inner();
    let schedule = Schedule::build(&workflow.nodes, &workflow.edges);
    let cycles = find_cycles(&workflow.nodes, &workflow.edges);
    let issues = validate(&workflow, data.runtime.registry());

    Ok(HttpResponse::Ok().json(ScheduleResponse {
        schedule,
        cycles,
        issues,
    }))
}

/// Labels a logic body reads through `$node`
#[post("/api/dependencies")]
async fn analyze_dependencies(req: web::Json<DependenciesRequest>) -> ActixResult<impl Responder> {
    let response = match try_extract_dependencies(&req.code) {
        Ok(dependencies) => DependenciesResponse {
            dependencies,
            warning: None,
        },
        Err(e) => {
            warn!("Dependency analysis skipped: {}", e);
            DependenciesResponse {
                dependencies: BTreeSet::new(),
                warning: Some(e.to_string()),
            }
        }
    };
    Ok(HttpResponse::Ok().json(response))
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    // Subscribe to events
    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagging, {} events dropped", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type);
            serde_json::json!({
                "type": node_type,
                "description": metadata.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
                "category": metadata.as_ref().map(|m| m.category.clone()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Canvas Server");

    let config = RuntimeConfig::from_env();
    let registry = canvasnodes::standard_registry(&config);
    let runtime = WorkflowRuntime::new(registry, config);

    info!("✅ Runtime initialized with standard executors");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(run_workflow)
            .service(preview_schedule)
            .service(analyze_dependencies)
            .service(websocket_events)
            .service(list_node_types)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
