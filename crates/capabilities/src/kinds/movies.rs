//! Movie catalog lookup and playback through a Home Assistant webhook.
//!
//! The catalog is a JSON object mapping title ids to scraped metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cg_domain::error::{Error, Result};
use cg_domain::tool::ToolDefinition;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capability::{
    required_str, string_args_schema, Capability, CapabilityKind, ParameterSpec, ResolvedParams,
    Tool, ToolOutput,
};
use crate::http;
use crate::text_index::{IndexedText, KeywordIndex};

pub const KIND: &str = "movies";

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::user("movies_filename", "The local aggregated list of movies filename"),
    ParameterSpec::user("webhook_url", "The Home Assistant webhook url to play movies by id"),
];

const COMMANDS: &[(&str, &str)] = &[("reprocess_data", "Reload movies list")];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    description: Option<String>,
    watched: Option<bool>,
    #[serde(default)]
    genres: Vec<String>,
    genre_name: Option<String>,
    release_year: Option<Value>,
    match_score: Option<Value>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    cast: Vec<String>,
    #[serde(default)]
    directors: Vec<String>,
    #[serde(default)]
    writers: Vec<String>,
    box_art: Option<BoxArt>,
}

#[derive(Debug, Deserialize)]
struct BoxArt {
    url: String,
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One line per movie that has a description; series and bare entries
/// are left out.
fn describe(title_id: &str, entry: CatalogEntry) -> Option<IndexedText> {
    if entry.kind != "movie" {
        return None;
    }
    let description = entry.description?;

    let mut text = format!(
        "Title: {} - ID: {title_id} - Description: {description}",
        entry.title
    );
    if let Some(watched) = entry.watched {
        text.push_str(if watched { " - Watched: Yes" } else { " - Watched: No" });
    }
    let mut genres = entry.genres;
    if let Some(name) = entry.genre_name {
        genres.push(name);
    }
    let lists = [
        ("Genres", &genres),
        ("Tags", &entry.tags),
        ("Cast", &entry.cast),
        ("Directors", &entry.directors),
        ("Writers", &entry.writers),
    ];
    if let Some(year) = &entry.release_year {
        text.push_str(&format!(" - Year: {}", scalar(year)));
    }
    if let Some(score) = &entry.match_score {
        text.push_str(&format!(" - Affinity: {}", scalar(score)));
    }
    for (label, values) in lists {
        if !values.is_empty() {
            text.push_str(&format!(" - {label}: {}", values.join(",")));
        }
    }
    if let Some(art) = entry.box_art {
        text.push_str(&format!(" - Poster URL: {}", art.url));
    }

    Some(IndexedText {
        id: title_id.to_owned(),
        text,
    })
}

fn parse_catalog(raw: &str) -> Result<Vec<IndexedText>> {
    let catalog: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    let mut docs = Vec::new();
    for (title_id, value) in catalog {
        match serde_json::from_value::<CatalogEntry>(value) {
            Ok(entry) => docs.extend(describe(&title_id, entry)),
            Err(e) => tracing::debug!(title_id = %title_id, error = %e, "skipping catalog entry"),
        }
    }
    Ok(docs)
}

async fn load_catalog(path: &Path) -> Result<KeywordIndex> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::capability(KIND, format!("cannot read {}: {e}", path.display())))?;
    let docs = parse_catalog(&raw)?;
    tracing::info!(path = %path.display(), movies = docs.len(), "movie catalog indexed");
    Ok(KeywordIndex::new(docs))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MoviesKind {
    http: reqwest::Client,
    max_results: usize,
}

impl MoviesKind {
    pub fn new(http_timeout_ms: u64, max_results: usize) -> Result<Self> {
        Ok(Self {
            http: http::client(http_timeout_ms)?,
            max_results,
        })
    }
}

#[async_trait::async_trait]
impl CapabilityKind for MoviesKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Search the movie catalog and start playback"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    fn commands(&self) -> &'static [(&'static str, &'static str)] {
        COMMANDS
    }

    async fn construct(&self, params: ResolvedParams) -> Result<Arc<dyn Capability>> {
        let catalog_path = PathBuf::from(params.require("movies_filename")?);
        let index = load_catalog(&catalog_path).await?;
        Ok(Arc::new(Movies {
            catalog_path,
            index: Arc::new(RwLock::new(index)),
            player: Arc::new(PlayerTool {
                http: self.http.clone(),
                webhook_url: params.require("webhook_url")?.to_owned(),
            }),
            max_results: self.max_results,
        }))
    }
}

struct Movies {
    catalog_path: PathBuf,
    index: Arc<RwLock<KeywordIndex>>,
    player: Arc<PlayerTool>,
    max_results: usize,
}

#[async_trait::async_trait]
impl Capability for Movies {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(CatalogTool {
                index: self.index.clone(),
                max_results: self.max_results,
            }),
            self.player.clone(),
        ]
    }

    async fn run_command(&self, command: &str) -> Result<String> {
        match command {
            "reprocess_data" => {
                let fresh = load_catalog(&self.catalog_path).await?;
                let count = fresh.len();
                *self.index.write() = fresh;
                Ok(format!("{count} movies indexed"))
            }
            other => Err(Error::capability(KIND, format!("unknown command '{other}'"))),
        }
    }
}

struct CatalogTool {
    index: Arc<RwLock<KeywordIndex>>,
    max_results: usize,
}

#[async_trait::async_trait]
impl Tool for CatalogTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "movies_catalog".into(),
            description: "Retrieve information about movies in the catalog: id, description, \
                          genres, cast, whether it was watched."
                .into(),
            parameters: string_args_schema(&[("query", "Title, genre, actor or topic to search for")]),
        }
    }

    fn name(&self) -> &str {
        "movies_catalog"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(out) => return out,
        };
        let index = self.index.read();
        let hits = index.search(query, self.max_results);
        if hits.is_empty() {
            return ToolOutput::ok("No matching movies found.");
        }
        ToolOutput::ok(
            hits.iter()
                .map(|h| h.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

struct PlayerTool {
    http: reqwest::Client,
    webhook_url: String,
}

#[async_trait::async_trait]
impl Tool for PlayerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "netflix_player".into(),
            description: "Play a movie when the user asks to watch it.".into(),
            parameters: string_args_schema(&[("movie_id", "The movie id to play.")]),
        }
    }

    fn name(&self) -> &str {
        "netflix_player"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let movie_id = match required_str(args, "movie_id") {
            Ok(id) => id,
            Err(out) => return out,
        };
        tracing::info!(movie_id = %movie_id, "starting playback");
        let req = self.http.get(&self.webhook_url).query(&[("id", movie_id)]);
        match http::send_text(req).await {
            Ok(_) => ToolOutput::ok(format!("Playback of movie {movie_id} started")),
            Err(e) => ToolOutput::error(format!("Could not start playback of movie {movie_id}: {e}")),
        }
    }
}
