use std::collections::HashMap;

use common::ImportRequest;

/// Descriptor de una tarea antes de tener id asignado.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub collection_name: String,
    pub partition_name: String,
    pub row_based: bool,
    pub files: Vec<String>,
    pub options: HashMap<String, String>,
}

/// Parte un request de importación en descriptores de tarea:
/// - por filas: un descriptor por archivo, en el mismo orden
/// - por columnas: un único descriptor con todos los archivos
///
/// Las opciones del request pisan a los defaults clave por clave.
/// Se asume request ya validado (al menos un archivo).
pub fn split(req: &ImportRequest, defaults: &HashMap<String, String>) -> Vec<TaskDescriptor> {
    let mut options = defaults.clone();
    options.extend(req.options.iter().map(|(k, v)| (k.clone(), v.clone())));

    let descriptor = |files: Vec<String>| TaskDescriptor {
        collection_name: req.collection_name.clone(),
        partition_name: req.partition_name.clone(),
        row_based: req.row_based,
        files,
        options: options.clone(),
    };

    if req.row_based {
        req.files
            .iter()
            .map(|f| descriptor(vec![f.clone()]))
            .collect()
    } else {
        vec![descriptor(req.files.clone())]
    }
}
