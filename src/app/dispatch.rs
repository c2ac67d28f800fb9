use crate::app::render::{render_list, render_memory, render_stats};
use crate::cli::commands::{Cli, Commands, FilterArgs};
use anyhow::{Context, Result};
use memoria::Config;
use memoria::core::memory::{
    AddDisposition, AddRequest, EmbeddingProvider, EngineConfig, IndexConfig, MemoryEngine,
    Metadata, ScopeFilter, create_embedding_provider, create_vector_store,
};
use memoria::ui::style as ui;
use serde_json::Value;
use tracing::info;

/// `key=value` pairs; values that parse as JSON scalars keep their type.
fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, Value)>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got '{pair}'"))?;
            let value = match serde_json::from_str::<Value>(raw) {
                Ok(parsed) if !parsed.is_array() && !parsed.is_object() => parsed,
                _ => Value::String(raw.to_string()),
            };
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

fn scope_filter(args: &FilterArgs) -> Result<ScopeFilter> {
    let mut filter = ScopeFilter::all();
    filter.user_id.clone_from(&args.user);
    filter.agent_id.clone_from(&args.agent);
    for (key, value) in parse_pairs(&args.filters)? {
        filter = filter.with_filter(key, value);
    }
    Ok(filter)
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let store = create_vector_store(&config.store, &config.data_dir()).await?;
    let embedder = create_embedding_provider(&config.embedding, config.store.dimensions)?;
    let engine = MemoryEngine::new(store, EngineConfig::from_config(&config))?;
    info!(
        backend = engine.store().name(),
        embedder = embedder.name(),
        dimensions = config.store.dimensions,
        "memoria ready"
    );

    match cli.command {
        Commands::Add {
            scope,
            text,
            metadata,
        } => {
            let embedding = embed(embedder.as_ref(), &text).await?;
            let mut request = AddRequest::new(scope.user, text, embedding)
                .with_metadata(parse_pairs(&metadata)?.into_iter().collect::<Metadata>());
            request.agent_id = scope.agent;

            let outcome = engine.add(request).await?;
            match outcome.disposition {
                AddDisposition::Inserted => {
                    println!("{} stored #{}", ui::success("✓"), outcome.memory.id);
                }
                AddDisposition::Duplicate {
                    similarity, policy, ..
                } => println!(
                    "{} merged into #{} (similarity {similarity:.3}, {policy:?})",
                    ui::success("✓"),
                    outcome.memory.id
                ),
            }
            Ok(())
        }

        Commands::Get { id } => {
            println!("{}", render_memory(&engine.get(id).await?));
            Ok(())
        }

        Commands::Update { id, text } => {
            let embedding = embed(embedder.as_ref(), &text).await?;
            let updated = engine.update(id, &text, &embedding).await?;
            println!("{}", render_memory(&updated));
            Ok(())
        }

        Commands::Delete { id } => {
            engine.delete(id).await?;
            println!("{} deleted #{id}", ui::success("✓"));
            Ok(())
        }

        Commands::Search {
            query,
            filter,
            limit,
        } => {
            let embedding = embed(embedder.as_ref(), &query).await?;
            let filter = scope_filter(&filter)?.with_limit(limit);
            println!("{}", render_list(&engine.search(&embedding, &filter).await?));
            Ok(())
        }

        Commands::List {
            filter,
            limit,
            offset,
        } => {
            let filter = scope_filter(&filter)?.with_limit(limit).with_offset(offset);
            println!("{}", render_list(&engine.get_all(&filter).await?));
            Ok(())
        }

        Commands::Reset { scope } => {
            let removed = engine.reset(&scope.user, scope.agent.as_deref()).await?;
            println!("{} removed {removed} memories", ui::success("✓"));
            Ok(())
        }

        Commands::Index {
            algorithm,
            metric,
            partitions,
            sub_vectors,
        } => {
            let index = IndexConfig {
                algorithm,
                metric,
                num_partitions: partitions,
                num_sub_vectors: sub_vectors,
                ..IndexConfig::default()
            };
            engine.create_index(&index).await?;
            if engine.store().capabilities().native_index {
                println!("{} vector index ready", ui::success("✓"));
            } else {
                println!(
                    "{}",
                    ui::yellow(format!(
                        "{} scores exactly; no index needed",
                        engine.store().name()
                    ))
                );
            }
            Ok(())
        }

        Commands::Stale {
            filter,
            threshold,
            limit,
        } => {
            let filter = scope_filter(&filter)?.with_limit(limit);
            println!(
                "{}",
                render_list(&engine.stale_memories(&filter, threshold).await?)
            );
            Ok(())
        }

        Commands::Stats { filter } => {
            println!("{}", render_stats(&engine.stats(&scope_filter(&filter)?).await?));
            Ok(())
        }

        Commands::Used { id } => {
            println!("{}", render_memory(&engine.mark_used(id).await?));
            Ok(())
        }
    }
}

async fn embed(embedder: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(text)
        .await
        .with_context(|| format!("failed to embed with provider '{}'", embedder.name()))
}
