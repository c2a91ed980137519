use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use common::{
    ImportRequest, ImportResponse, ImportResult, Status, TaskInfo, TaskState, TaskStateResponse,
    BUCKET,
};
use reqwest::Client;
use std::collections::HashMap;
use std::env;

/// - En Docker: COORDINATOR_URL=http://coordinator:8080
/// - Local: default http://localhost:8080
fn coordinator_base_url() -> String {
    env::var("COORDINATOR_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para enviar y seguir importaciones masivas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía un job de importación
    Import {
        #[arg(value_name = "COLLECTION")]
        collection: String,

        /// Archivos a importar, en orden
        #[arg(value_name = "FILES", required = true)]
        files: Vec<String>,

        #[arg(long, default_value = "_default")]
        partition: String,

        /// Todos los archivos son columnas de un mismo lote (una sola tarea)
        #[arg(long)]
        column_based: bool,

        /// Bucket donde están los archivos
        #[arg(long)]
        bucket: Option<String>,

        /// Opciones extra clave=valor (repetible)
        #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
    /// Consulta el estado de una tarea
    State {
        #[arg(value_name = "TASK_ID")]
        id: i64,
    },
    /// Lista todas las tareas conocidas por el coordinador
    Tasks,
    /// Manda a mano un reporte de worker (útil para pruebas)
    Report {
        #[arg(value_name = "TASK_ID")]
        id: i64,

        #[arg(long, value_enum)]
        state: StateArg,

        #[arg(long, default_value_t = 0)]
        row_count: i64,

        #[arg(long)]
        node_id: Option<String>,

        #[arg(long)]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StateArg {
    Pending,
    Started,
    Persisting,
    Completed,
    Failed,
}

impl From<StateArg> for TaskState {
    fn from(s: StateArg) -> Self {
        match s {
            StateArg::Pending => TaskState::Pending,
            StateArg::Started => TaskState::Started,
            StateArg::Persisting => TaskState::Persisting,
            StateArg::Completed => TaskState::Completed,
            StateArg::Failed => TaskState::Failed,
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("se esperaba KEY=VALUE, llegó '{raw}'")),
    }
}

fn build_request(
    collection: String,
    partition: String,
    files: Vec<String>,
    column_based: bool,
    bucket: Option<String>,
    extra: Vec<(String, String)>,
) -> ImportRequest {
    let mut options: HashMap<String, String> = extra.into_iter().collect();
    if let Some(b) = bucket {
        options.insert(BUCKET.to_string(), b);
    }

    ImportRequest {
        collection_name: collection,
        partition_name: partition,
        row_based: !column_based,
        files,
        options,
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = coordinator_base_url();

    match cli.command {
        Commands::Import {
            collection,
            files,
            partition,
            column_based,
            bucket,
            options,
        } => {
            let url = format!("{}/api/v1/import", base_url);
            let req = build_request(collection, partition, files, column_based, bucket, options);

            let resp: ImportResponse = client.post(&url).json(&req).send().await?.json().await?;

            if !resp.status.is_success() {
                println!(
                    "Job rechazado: {:?} {}",
                    resp.status.error_code, resp.status.reason
                );
            } else {
                println!("Job aceptado:");
            }
            if !resp.tasks.is_empty() {
                println!("  tareas: {:?}", resp.tasks);
            }
        }

        Commands::State { id } => {
            let url = format!("{}/api/v1/import/tasks/{id}", base_url);
            let resp: TaskStateResponse = client.get(&url).send().await?.json().await?;

            if resp.status.is_success() {
                println!("Tarea {id}:");
                println!("  estado: {:?}", resp.state);
                println!("  filas: {}", resp.row_count);
                if let Some(err) = resp.error {
                    println!("  error: {}", err);
                }
            } else {
                println!("Tarea {id} desconocida ({})", resp.status.reason);
            }
        }

        Commands::Tasks => {
            let url = format!("{}/api/v1/import/tasks", base_url);
            let tasks: Vec<TaskInfo> = client.get(&url).send().await?.json().await?;

            if tasks.is_empty() {
                println!("No hay tareas.");
            }
            for t in tasks {
                println!("Tarea {}", t.id);
                println!("  destino       : {}/{}", t.collection_name, t.partition_name);
                println!("  archivos      : {}", t.files.join(", "));
                println!("  estado        : {:?}", t.state);
                println!("  filas         : {}", t.row_count);
                println!(
                    "  despachada    : {} (intentos={})",
                    t.dispatched, t.dispatch_attempts
                );
                if let Some(node) = t.node_id {
                    println!("  nodo          : {}", node);
                }
                if let Some(err) = t.error {
                    println!("  error         : {}", err);
                }
                println!();
            }
        }

        Commands::Report {
            id,
            state,
            row_count,
            node_id,
            error,
        } => {
            let report = ImportResult {
                task_id: id,
                state: state.into(),
                row_count,
                node_id,
                error,
            };

            send_report(&client, &base_url, &report).await?;
            println!("Reporte aplicado a la tarea {id}");
        }
    }

    Ok(())
}

/// El coordinador responde 404 sin body JSON para ids desconocidos, así que
/// el código HTTP se mira antes de decodificar nada.
async fn send_report(client: &Client, base_url: &str, report: &ImportResult) -> Result<()> {
    let url = format!("{}/api/v1/import/tasks/report", base_url);
    let resp = client.post(&url).json(report).send().await?;

    let code = resp.status();
    if !code.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("reporte rechazado ({}): {}", code, body);
    }

    let st: Status = resp.json().await?;
    if !st.is_success() {
        bail!("reporte rechazado: {}", st.reason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_report() -> ImportResult {
        ImportResult {
            task_id: 42,
            state: TaskState::Started,
            row_count: 0,
            node_id: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn reporte_404_sin_body_json_informa_el_codigo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/import/tasks/report"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = send_report(&Client::new(), &server.uri(), &sample_report())
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("404"), "mensaje: {err}");
        assert!(err.contains("not found"), "mensaje: {err}");
    }

    #[tokio::test]
    async fn reporte_aceptado_devuelve_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/import/tasks/report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Status::success()))
            .mount(&server)
            .await;

        send_report(&Client::new(), &server.uri(), &sample_report())
            .await
            .unwrap();
    }

    #[test]
    fn key_value_valido_e_invalido() {
        assert_eq!(
            parse_key_value("timeout=60").unwrap(),
            ("timeout".to_string(), "60".to_string())
        );
        assert_eq!(
            parse_key_value("path=a=b").unwrap(),
            ("path".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("sin_igual").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn import_por_columnas_con_bucket() {
        let cli = Cli::try_parse_from([
            "client",
            "import",
            "c1",
            "id.npy",
            "vec.npy",
            "--column-based",
            "--bucket",
            "mybucket",
            "--option",
            "k=v",
        ])
        .unwrap();

        let Commands::Import {
            collection,
            files,
            partition,
            column_based,
            bucket,
            options,
        } = cli.command
        else {
            panic!("se esperaba subcomando import");
        };

        let req = build_request(collection, partition, files, column_based, bucket, options);
        assert!(!req.row_based);
        assert_eq!(req.partition_name, "_default");
        assert_eq!(req.files.len(), 2);
        assert_eq!(req.options.get(BUCKET).map(String::as_str), Some("mybucket"));
        assert_eq!(req.options.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn import_sin_archivos_no_parsea() {
        assert!(Cli::try_parse_from(["client", "import", "c1"]).is_err());
    }

    #[test]
    fn report_convierte_el_estado() {
        let cli = Cli::try_parse_from([
            "client",
            "report",
            "7",
            "--state",
            "completed",
            "--row-count",
            "1000",
        ])
        .unwrap();

        match cli.command {
            Commands::Report {
                id,
                state,
                row_count,
                ..
            } => {
                assert_eq!(id, 7);
                assert_eq!(TaskState::from(state), TaskState::Completed);
                assert_eq!(row_count, 1000);
            }
            _ => panic!("se esperaba subcomando report"),
        }
    }
}
