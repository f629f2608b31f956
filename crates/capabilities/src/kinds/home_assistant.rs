//! Home Assistant: entity lookup, status and service calls over the REST API.

use std::collections::HashMap;
use std::sync::Arc;

use cg_domain::config::HomeAssistantConfig;
use cg_domain::error::{Error, Result};
use cg_domain::tool::ToolDefinition;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capability::{
    required_str, string_args_schema, Capability, CapabilityKind, ParameterSpec, ResolvedParams,
    Tool, ToolOutput, IDENTITY_USER_ID,
};
use crate::http;
use crate::text_index::{IndexedText, KeywordIndex};

pub const KIND: &str = "home_assistant";

const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::user("url", "Home Assistant URL"),
    ParameterSpec::user("bearer_token", "The bearer token to authenticate on Home Assistant"),
    ParameterSpec::identity(IDENTITY_USER_ID, "Owner of the entity index"),
];

const COMMANDS: &[(&str, &str)] = &[("reprocess_data", "Reload Home Assistant entities and definitions")];

const CONNECTION_ERROR: &str =
    "Error while connecting to the home-assistant instance, maybe the configuration is wrong";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REST client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ServiceDomain {
    domain: String,
    #[serde(default)]
    services: Map<String, Value>,
}

struct HaClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HaClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Authenticated `GET api/`; fails on a bad URL or a rejected token.
    async fn ping(&self) -> Result<()> {
        let req = self.http.get(self.url("api/")).bearer_auth(&self.token);
        http::send_json(req).await.map(|_| ())
    }

    async fn states(&self) -> Result<Vec<EntityState>> {
        let req = self.http.get(self.url("api/states")).bearer_auth(&self.token);
        Ok(serde_json::from_value(http::send_json(req).await?)?)
    }

    async fn state(&self, entity_id: &str) -> Result<EntityState> {
        let req = self
            .http
            .get(self.url(&format!("api/states/{entity_id}")))
            .bearer_auth(&self.token);
        Ok(serde_json::from_value(http::send_json(req).await?)?)
    }

    /// `{domain: [service, ...]}`
    async fn services(&self) -> Result<HashMap<String, Vec<String>>> {
        let req = self.http.get(self.url("api/services")).bearer_auth(&self.token);
        let domains: Vec<ServiceDomain> = serde_json::from_value(http::send_json(req).await?)?;
        Ok(domains
            .into_iter()
            .map(|d| (d.domain, d.services.keys().cloned().collect()))
            .collect())
    }

    async fn call_service(&self, domain: &str, service: &str, entity_id: &str) -> Result<()> {
        let req = self
            .http
            .post(self.url(&format!("api/services/{domain}/{service}")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "entity_id": entity_id }));
        http::send_text(req).await.map(|_| ())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn entity_domain(entity_id: &str) -> &str {
    entity_id.split('.').next().unwrap_or(entity_id)
}

fn is_slug(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `domain.object_id`, both parts `[A-Za-z0-9_]`; anything else never reaches
/// a request path.
fn is_entity_id(entity_id: &str) -> bool {
    matches!(entity_id.split_once('.'), Some((domain, object)) if is_slug(domain) && is_slug(object))
}

fn is_exposed(filters: &HomeAssistantConfig, entity_id: &str) -> bool {
    filters.entity_ids.iter().any(|e| e == entity_id)
        || filters
            .allowed_domains
            .iter()
            .any(|d| d == entity_domain(entity_id))
}

fn summarize(entity: &EntityState, services: &HashMap<String, Vec<String>>) -> String {
    let domain = entity_domain(&entity.entity_id);
    let friendly = entity
        .attributes
        .get("friendly_name")
        .and_then(Value::as_str)
        .unwrap_or(&entity.entity_id);
    let mut text = format!(
        "The entity with friendly name \"{friendly}\" is of type {domain}, the identifier is {}; \
         its current status can be read",
        entity.entity_id
    );
    if let Some(actions) = services.get(domain).filter(|a| !a.is_empty()) {
        text.push_str(&format!(
            " and it allows the following actions: {}",
            actions.join(", ")
        ));
    }
    text
}

fn build_index(
    filters: &HomeAssistantConfig,
    states: &[EntityState],
    services: &HashMap<String, Vec<String>>,
) -> KeywordIndex {
    let docs = states
        .iter()
        .filter(|e| is_exposed(filters, &e.entity_id))
        .map(|e| IndexedText {
            id: e.entity_id.clone(),
            text: summarize(e, services),
        })
        .collect();
    KeywordIndex::new(docs)
}

type SharedIndex = Arc<RwLock<KeywordIndex>>;

/// Index built for one user, valid while the connection settings match.
struct CachedIndex {
    base_url: String,
    token: String,
    index: SharedIndex,
}

impl CachedIndex {
    fn matches(&self, client: &HaClient) -> bool {
        self.base_url == client.base_url && self.token == client.token
    }
}

async fn fetch_index(client: &HaClient, filters: &HomeAssistantConfig) -> Result<KeywordIndex> {
    let states = client.states().await?;
    let services = client.services().await?;
    let index = build_index(filters, &states, &services);
    tracing::info!(
        base_url = %client.base_url,
        entities = states.len(),
        indexed = index.len(),
        "home assistant entities indexed"
    );
    Ok(index)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HomeAssistantKind {
    filters: Arc<HomeAssistantConfig>,
    http: reqwest::Client,
    max_results: usize,
    /// Entity index per user, kept across session rebuilds.
    indexes: Mutex<HashMap<String, CachedIndex>>,
}

impl HomeAssistantKind {
    pub fn new(filters: HomeAssistantConfig, http_timeout_ms: u64, max_results: usize) -> Result<Self> {
        Ok(Self {
            filters: Arc::new(filters),
            http: http::client(http_timeout_ms)?,
            max_results,
            indexes: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, user_id: &str, client: &HaClient) -> Option<SharedIndex> {
        self.indexes
            .lock()
            .get(user_id)
            .filter(|c| c.matches(client))
            .map(|c| c.index.clone())
    }
}

#[async_trait::async_trait]
impl CapabilityKind for HomeAssistantKind {
    fn name(&self) -> &'static str {
        KIND
    }

    fn description(&self) -> &'static str {
        "Read and control Home Assistant entities"
    }

    fn parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    fn commands(&self) -> &'static [(&'static str, &'static str)] {
        COMMANDS
    }

    async fn construct(&self, params: ResolvedParams) -> Result<Arc<dyn Capability>> {
        let client = Arc::new(HaClient {
            base_url: params.require("url")?.trim_end_matches('/').to_owned(),
            token: params.require("bearer_token")?.to_owned(),
            http: self.http.clone(),
        });

        let user_id = params.user_id().to_owned();
        let cannot_reach = |e: Error| Error::capability(KIND, format!("cannot reach {}: {e}", client.base_url));

        if let Err(e) = client.ping().await {
            self.indexes.lock().remove(&user_id);
            return Err(cannot_reach(e));
        }

        let index = match self.cached(&user_id, &client) {
            Some(index) => index,
            None => {
                let index = fetch_index(&client, &self.filters).await.map_err(|e| {
                    self.indexes.lock().remove(&user_id);
                    cannot_reach(e)
                })?;
                let index = Arc::new(RwLock::new(index));
                self.indexes.lock().insert(
                    user_id,
                    CachedIndex {
                        base_url: client.base_url.clone(),
                        token: client.token.clone(),
                        index: index.clone(),
                    },
                );
                index
            }
        };

        Ok(Arc::new(HomeAssistant {
            client,
            filters: self.filters.clone(),
            index,
            max_results: self.max_results,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Instance and tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct HomeAssistant {
    client: Arc<HaClient>,
    filters: Arc<HomeAssistantConfig>,
    index: SharedIndex,
    max_results: usize,
}

#[async_trait::async_trait]
impl Capability for HomeAssistant {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(EntitiesTool {
                index: self.index.clone(),
                max_results: self.max_results,
            }),
            Arc::new(StatusTool {
                client: self.client.clone(),
            }),
            Arc::new(ActionTool {
                client: self.client.clone(),
            }),
        ]
    }

    async fn run_command(&self, command: &str) -> Result<String> {
        match command {
            "reprocess_data" => {
                let fresh = fetch_index(&self.client, &self.filters).await?;
                let count = fresh.len();
                *self.index.write() = fresh;
                Ok(format!("{count} entities indexed"))
            }
            other => Err(Error::capability(KIND, format!("unknown command '{other}'"))),
        }
    }
}

struct EntitiesTool {
    index: SharedIndex,
    max_results: usize,
}

#[async_trait::async_trait]
impl Tool for EntitiesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "home_assistant_entities".into(),
            description: "Find the Home Assistant identifier, type and supported actions of \
                          entities. Required before getting the status of an entity or running \
                          an action on it."
                .into(),
            parameters: string_args_schema(&[("query", "Description of the entities to find, e.g. 'studio lights'")]),
        }
    }

    fn name(&self) -> &str {
        "home_assistant_entities"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(out) => return out,
        };
        let index = self.index.read();
        let hits = index.search(query, self.max_results);
        if hits.is_empty() {
            return ToolOutput::ok("No matching Home Assistant entities found.");
        }
        ToolOutput::ok(
            hits.iter()
                .map(|h| h.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

struct StatusTool {
    client: Arc<HaClient>,
}

#[async_trait::async_trait]
impl Tool for StatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "home_assistant_status".into(),
            description: "Get the status of a Home Assistant entity. The entity_id must match \
                          one returned by home_assistant_entities."
                .into(),
            parameters: string_args_schema(&[("entity_id", "The home-assistant entity identifier.")]),
        }
    }

    fn name(&self) -> &str {
        "home_assistant_status"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let entity_id = match required_str(args, "entity_id") {
            Ok(id) => id,
            Err(out) => return out,
        };
        if !is_entity_id(entity_id) {
            return ToolOutput::error(format!("'{entity_id}' is not a Home Assistant entity id"));
        }
        match self.client.state(entity_id).await {
            Ok(entity) => ToolOutput::ok(format!(
                "The entity status is {} and the other attributes are {}",
                entity.state,
                Value::Object(entity.attributes)
            )),
            Err(e) => ToolOutput::error(format!("{CONNECTION_ERROR}: {e}")),
        }
    }
}

struct ActionTool {
    client: Arc<HaClient>,
}

#[async_trait::async_trait]
impl Tool for ActionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "home_assistant_action".into(),
            description: "Execute an action on a Home Assistant entity. The entity_id, \
                          entity_type and action must match the ones returned by \
                          home_assistant_entities."
                .into(),
            parameters: string_args_schema(&[
                ("entity_id", "The home-assistant entity identifier."),
                ("entity_type", "The home-assistant entity type."),
                ("action", "The home-assistant action to run."),
            ]),
        }
    }

    fn name(&self) -> &str {
        "home_assistant_action"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> ToolOutput {
        let (entity_id, entity_type, action) = match (
            required_str(args, "entity_id"),
            required_str(args, "entity_type"),
            required_str(args, "action"),
        ) {
            (Ok(id), Ok(ty), Ok(action)) => (id, ty, action),
            (Err(out), _, _) | (_, Err(out), _) | (_, _, Err(out)) => return out,
        };
        if !is_entity_id(entity_id) || !is_slug(entity_type) || !is_slug(action) {
            return ToolOutput::error(format!(
                "Error, '{entity_type}.{action}' on '{entity_id}' is not a valid Home Assistant action"
            ));
        }

        tracing::info!(entity_id = %entity_id, action = %action, "home assistant service call");
        match self.client.call_service(entity_type, action, entity_id).await {
            Ok(()) => ToolOutput::ok(format!("The action {action} has been executed on {entity_id}")),
            Err(e) => ToolOutput::error(format!(
                "Error, the action {action} has not been executed on {entity_id}: {e}"
            )),
        }
    }
}
