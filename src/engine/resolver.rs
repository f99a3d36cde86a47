use indexmap::IndexMap;

use crate::core::{OutputFile, ToolOutput};

/// Well-known slot carrying the output directory in a resolved mapping.
pub const OUTPUT_DIR_SLOT: &str = "OUTPUT_DIR";

/// Match produced files to a tool's declared output slots.
///
/// The mapping is seeded with the output-directory slot when a directory was
/// supplied. Each declared slot, in declaration order, takes the first file
/// whose name contains the slot name as a case-insensitive substring; later
/// candidates are ignored. A slot with no matching file is simply absent,
/// meaning no corresponding output was produced.
pub fn resolve_outputs(
    files: &[OutputFile],
    slots: &[ToolOutput],
    output_dir: Option<&str>,
) -> IndexMap<String, String> {
    let mut results = IndexMap::new();
    if let Some(dir) = output_dir {
        results.insert(OUTPUT_DIR_SLOT.to_string(), dir.to_string());
    }
    for slot in slots {
        let needle = slot.name.to_lowercase();
        if let Some(file) = files
            .iter()
            .find(|f| f.name.to_lowercase().contains(&needle))
        {
            results.insert(slot.name.clone(), file.path.clone());
        }
    }
    results
}
