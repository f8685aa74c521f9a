use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use keel_dictionary::{assemble, parse_dictionary, DictionaryError, TypeDictionary};
use keel_ids::{IdError, IdStrategy, IdStrategyPair};
use keel_sdk::PersistenceConfig;
use keel_types::{ObjectId, PersistentId, TypeId};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Dict(args) => match args.action {
            DictAction::Check { file } => cmd_dict_check(&file, format),
            DictAction::Fmt { file, write } => cmd_dict_fmt(&file, write),
            DictAction::Show { file } => cmd_dict_show(&file, format),
        },
        Command::Ids(args) => match args.action {
            IdsAction::Parse { strategy } => cmd_ids_parse(&strategy, format),
        },
        Command::Config(args) => match args.action {
            ConfigAction::Check { file } => cmd_config_check(&file, format),
        },
    }
}

// ---- dict ----

fn read_dictionary(path: &Path) -> anyhow::Result<(String, TypeDictionary)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match parse_dictionary(&text) {
        Ok(dictionary) => {
            debug!(path = %path.display(), types = dictionary.len(), "dictionary parsed");
            Ok((text, dictionary))
        }
        Err(DictionaryError::Parse(e)) => bail!(
            "{}",
            point_at(&path.display().to_string(), &text, e.offset, &e.kind.to_string())
        ),
        Err(e) => Err(e).with_context(|| format!("invalid dictionary {}", path.display())),
    }
}

fn cmd_dict_check(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let (text, dictionary) = read_dictionary(path)?;
    println!("{}", render_check(path, &text, &dictionary, format));
    Ok(())
}

fn render_check(path: &Path, text: &str, dictionary: &TypeDictionary, format: OutputFormat) -> String {
    let canonical = assemble(dictionary) == text;
    let lineages = dictionary.lineages().count();
    let highest = dictionary.highest_type_id().map(TypeId::get);
    match format {
        OutputFormat::Json => json!({
            "path": path.display().to_string(),
            "types": dictionary.len(),
            "lineages": lineages,
            "highest_type_id": highest,
            "canonical": canonical,
        })
        .to_string(),
        OutputFormat::Text => {
            let mut out = format!(
                "{} {}: {} types in {} lineages",
                "✓".green().bold(),
                path.display(),
                dictionary.len(),
                lineages
            );
            if let Some(highest) = highest {
                out.push_str(&format!(", highest type id {}", highest.to_string().bold()));
            }
            if !canonical {
                out.push_str(&format!(
                    "\n  {} not in canonical form (run `keel dict fmt --write`)",
                    "!".yellow().bold()
                ));
            }
            out
        }
    }
}

fn cmd_dict_fmt(path: &Path, write: bool) -> anyhow::Result<()> {
    let (text, dictionary) = read_dictionary(path)?;
    let canonical = assemble(&dictionary);
    if !write {
        print!("{canonical}");
        return Ok(());
    }
    if canonical == text {
        println!("{} {} already formatted", "✓".green(), path.display());
        return Ok(());
    }
    fs::write(path, &canonical).with_context(|| format!("failed to write {}", path.display()))?;
    println!("{} Formatted {}", "✓".green().bold(), path.display());
    Ok(())
}

fn cmd_dict_show(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let (_, dictionary) = read_dictionary(path)?;
    println!("{}", render_show(&dictionary, format));
    Ok(())
}

fn render_show(dictionary: &TypeDictionary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            let types: Vec<_> = dictionary
                .descriptions()
                .map(|d| {
                    let latest = dictionary
                        .lineage(d.type_name())
                        .and_then(|l| l.latest())
                        .is_some_and(|l| l.type_id() == d.type_id());
                    json!({
                        "type_id": d.type_id().get(),
                        "type_name": d.type_name(),
                        "enum": d.is_enum(),
                        "latest": latest,
                        "members": d.all_members().iter().map(ToString::to_string).collect::<Vec<_>>(),
                    })
                })
                .collect();
            json!({ "types": types }).to_string()
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for d in dictionary.descriptions() {
                let mut header = format!("{} {}", d.type_id().to_string().dimmed(), d.type_name().bold());
                if d.is_enum() {
                    header.push_str(&format!(" {}", "enum".cyan()));
                }
                out.push_str(&header);
                out.push('\n');
                for member in d.all_members() {
                    out.push_str(&format!("  {member}\n"));
                }
            }
            if out.is_empty() {
                out.push_str("No types.");
            }
            out.trim_end().to_string()
        }
    }
}

// ---- ids ----

fn cmd_ids_parse(input: &str, format: OutputFormat) -> anyhow::Result<()> {
    println!("{}", render_ids(input, format)?);
    Ok(())
}

fn render_ids(input: &str, format: OutputFormat) -> anyhow::Result<String> {
    let pair = input.contains(':');
    let parsed = if pair {
        IdStrategyPair::parse(input).map(|p| {
            (
                p.to_string(),
                vec![
                    ("type", describe::<TypeId>(&p.type_strategy)),
                    ("object", describe::<ObjectId>(&p.object_strategy)),
                ],
            )
        })
    } else {
        IdStrategy::parse(input).map(|s| (s.to_string(), vec![("ids", describe::<TypeId>(&s))]))
    };
    let (canonical, details) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            let offset = match e {
                IdError::Parse { offset, .. } | IdError::UnknownStrategy { offset, .. } => offset,
                other => return Err(other.into()),
            };
            bail!("{}", point_at("strategy", input, offset, &e.to_string()));
        }
    };
    Ok(match format {
        OutputFormat::Json => {
            let mut value = json!({ "canonical": canonical });
            for (key, text) in details {
                value[key] = json!(text);
            }
            value.to_string()
        }
        OutputFormat::Text => {
            let mut out = format!("{} {}", "✓".green().bold(), canonical.bold());
            for (key, text) in details {
                out.push_str(&format!("\n  {key}: {text}"));
            }
            out
        }
    })
}

fn describe<I: PersistentId>(strategy: &IdStrategy) -> String {
    match strategy {
        IdStrategy::Transient { seed } => format!(
            "in-memory {} ids after {}",
            I::LABEL,
            seed.unwrap_or(I::DEFAULT_START)
        ),
        IdStrategy::None => format!("no new {} ids", I::LABEL),
        IdStrategy::File { path } => format!("{} ids reserved in {}", I::LABEL, path.display()),
    }
}

// ---- config ----

fn cmd_config_check(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = PersistenceConfig::load(path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    let mapping = config.refactoring_mapping()?;
    debug!(empty_mapping = mapping.is_empty(), "refactoring mapping parsed");
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

// ---- Helpers ----

/// `source:line:column: message` followed by the offending line and a caret
/// under the character at `offset`.
fn point_at(source: &str, text: &str, offset: usize, message: &str) -> String {
    let mut line_no = 1;
    let mut line_start = 0;
    for (i, c) in text.chars().enumerate().take(offset) {
        if c == '\n' {
            line_no += 1;
            line_start = i + 1;
        }
    }
    let line: String = text
        .chars()
        .skip(line_start)
        .take_while(|&c| c != '\n')
        .collect();
    let column = offset - line_start;
    let pad: String = line
        .chars()
        .take(column)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    format!(
        "{source}:{line_no}:{}: {message}\n  {line}\n  {pad}^",
        column + 1
    )
}
