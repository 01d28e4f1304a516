use std::collections::BTreeMap;
use color_eyre::eyre::eyre;
use listener_xword::bench::{diff_results, read_json_or_default};

pub fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = std::env::args().collect::<Vec<_>>();
    let [_, left, right] = args.as_slice() else {
        return Err(eyre!("Usage: diff-bench left.json right.json"));
    };
    let left: BTreeMap<String, f64> = read_json_or_default(left)?;
    let right: BTreeMap<String, f64> = read_json_or_default(right)?;
    println!("{}", serde_json::to_string_pretty(&diff_results(&left, &right))?);
    Ok(())
}
