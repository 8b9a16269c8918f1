use crate::index::store::EntryStore;
use crate::index::types::Result;
use crate::output::{format_size, format_timestamp};
use std::path::Path;

/// Display store statistics.
pub fn show_stats(store: &EntryStore, store_path: &Path) -> Result<()> {
    let roots = store.list_roots()?;
    let total = store.entry_count(None)?;

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Store location:   {}", store_path.display());
    println!("Indexed entries:  {total}");
    println!("Watched roots:    {}", roots.len());

    if let Ok(meta) = std::fs::metadata(store_path) {
        println!("Store size:       {}", format_size(meta.len()));
    }

    if !roots.is_empty() {
        println!();
        println!("Entries by root:");
        for root in &roots {
            println!("  {:<50} {:>10}", root.path, root.entry_count);
        }
    }

    Ok(())
}

/// List all indexed roots.
pub fn list_roots(store: &EntryStore) -> Result<()> {
    let roots = store.list_roots()?;

    if roots.is_empty() {
        println!("No roots have been indexed yet.");
        return Ok(());
    }

    println!("Indexed Roots");
    println!("=============");
    println!();

    for root in roots {
        let exists = Path::new(&root.path).exists();
        let status = if exists { "" } else { " [missing]" };
        println!("  {}{}", root.path, status);
        println!(
            "    {} entries, generation {}, last pass {}",
            root.entry_count,
            root.generation,
            format_timestamp(root.last_indexed)
        );
        println!();
    }

    Ok(())
}
