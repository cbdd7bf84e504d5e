use crate::monitor::error::{MonitorError, MonitorResult};
use crate::types::type_tag::{module_prefix, parse_struct_tag};
use crate::types::{EventFilter, FunctionTarget, TransactionFilter, VenueConfig, VenueSelector};
use tracing::warn;

/// The node query a venue's watcher issues on every page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Events(EventFilter),
    Transactions(TransactionFilter),
}

impl QueryPlan {
    /// Module-level and function-call queries match a noisier stream than an exact type
    pub fn is_broad(&self) -> bool {
        !matches!(self, QueryPlan::Events(EventFilter::MoveEventType(_)))
    }
}

/// Derive the query for a venue, failing when no package+module can be recovered
pub fn build_query_plan(venue: &VenueConfig) -> MonitorResult<QueryPlan> {
    match &venue.selector {
        VenueSelector::EventType(event_type) => event_filter(&venue.name, event_type),
        VenueSelector::Module(type_string) => {
            module_filter(&venue.name, type_string).map(QueryPlan::Events)
        }
        VenueSelector::MoveFunction(target) => {
            function_filter(&venue.name, target).map(QueryPlan::Transactions)
        }
    }
}

fn event_filter(venue: &str, event_type: &str) -> MonitorResult<QueryPlan> {
    let event_type = event_type.trim();
    if let Some(tag) = parse_struct_tag(event_type) {
        if !tag.is_generic() {
            return Ok(QueryPlan::Events(EventFilter::MoveEventType(
                event_type.to_string(),
            )));
        }
    }

    let filter = module_filter(venue, event_type)?;
    warn!(
        "Venue {}: event type {} is generic or not well-formed, filtering by module {}",
        venue, event_type, filter
    );
    Ok(QueryPlan::Events(filter))
}

fn module_filter(venue: &str, type_string: &str) -> MonitorResult<EventFilter> {
    let (package, module) = module_prefix(type_string.trim()).ok_or_else(|| {
        MonitorError::ConfigError(format!(
            "Venue {}: cannot derive package and module from {:?}",
            venue, type_string
        ))
    })?;

    Ok(EventFilter::MoveModule {
        package: package.to_string(),
        module: module.to_string(),
    })
}

fn function_filter(venue: &str, target: &FunctionTarget) -> MonitorResult<TransactionFilter> {
    let path = format!("{}::{}", target.package, target.module);
    let valid_function = !target.function.is_empty()
        && target
            .function
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    match module_prefix(&path) {
        Some((_, module)) if module == target.module && valid_function => {
            Ok(TransactionFilter::MoveFunction(target.clone()))
        }
        _ => Err(MonitorError::ConfigError(format!(
            "Venue {}: invalid move function {}::{}::{}",
            venue, target.package, target.module, target.function
        ))),
    }
}
