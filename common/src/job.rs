use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::status::Status;
use crate::task::TaskId;

/// Clave de opción para sobreescribir el bucket de almacenamiento.
/// La ingesta por columnas la usa para encontrar los archivos hermanos.
pub const BUCKET: &str = "bucket";

/// Los campos que falten valen su default, así un body incompleto llega
/// a la validación del manager en vez de morir al deserializar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportRequest {
    pub collection_name: String,
    pub partition_name: String,

    /// true = un archivo por tarea; false = todos los archivos (columnas) en una sola tarea
    pub row_based: bool,

    /// Rutas de los archivos a importar, en orden
    pub files: Vec<String>,

    pub options: HashMap<String, String>,
}

/// Resultado de enviar un job de importación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    /// Refleja la validez del request, no el resultado del dispatch de cada tarea
    pub status: Status,

    /// Ids de las tareas creadas por este job, en orden de dispatch
    #[serde(default)]
    pub tasks: Vec<TaskId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_sin_options_deserializa_con_mapa_vacio() {
        let req: ImportRequest = serde_json::from_str(
            r#"{"collection_name":"c1","partition_name":"p1","row_based":true,"files":["f1"]}"#,
        )
        .unwrap();

        assert_eq!(req.files, vec!["f1".to_string()]);
        assert!(req.options.is_empty());
    }

    #[test]
    fn request_sin_files_deserializa_con_lista_vacia() {
        let req: ImportRequest = serde_json::from_str(
            r#"{"collection_name":"c1","partition_name":"p1","row_based":true}"#,
        )
        .unwrap();

        assert!(req.files.is_empty());
        assert_eq!(req.collection_name, "c1");
    }

    #[test]
    fn request_null_deserializa_como_none() {
        let req: Option<ImportRequest> = serde_json::from_str("null").unwrap();
        assert!(req.is_none());
    }
}
