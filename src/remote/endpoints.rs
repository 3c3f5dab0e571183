//! Catalogue of remote fleet API endpoints.
//!
//! Each query knows its cache key, its request and the tags its result
//! provides. Each mutation knows its request and the tags it invalidates.

use std::fmt;

use reqwest::Method;
use serde_json::Value;

use crate::cache::{QueryKey, Tag, TagKind};
use crate::errors::FleetResult;
use crate::models::{
    AddDriverRequest, AssignDriverRequest, CreateBusRequest, ListBusesParams, NewRouteStop,
    UpdateBusRequest, UpdateDriverRequest, UpdateRouteStopRequest,
};

/// A single HTTP call against the remote API, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(method: Method, path: impl Into<String>, body: Value) -> Self {
        Self {
            method,
            path: path.into(),
            body: Some(body),
        }
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Read endpoints whose results are cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    ListBuses(ListBusesParams),
    GetBus(String),
    /// Stops of one route, keyed by route id
    RouteStops(String),
    RouteStats,
    TodayTrips,
    ListDrivers,
    GetDriver(String),
}

impl Query {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Query::ListBuses(_) => "listBuses",
            Query::GetBus(_) => "getBus",
            Query::RouteStops(_) => "routeStops",
            Query::RouteStats => "routeStats",
            Query::TodayTrips => "todayTrips",
            Query::ListDrivers => "listDrivers",
            Query::GetDriver(_) => "getDriver",
        }
    }

    /// Cache key: endpoint plus serialized arguments.
    pub fn key(&self) -> QueryKey {
        let args = match self {
            Query::ListBuses(params) => params.to_query_string(),
            Query::GetBus(id) | Query::RouteStops(id) | Query::GetDriver(id) => id.clone(),
            Query::RouteStats | Query::TodayTrips | Query::ListDrivers => String::new(),
        };
        QueryKey::new(self.endpoint(), args)
    }

    pub fn request(&self) -> ApiRequest {
        match self {
            Query::ListBuses(params) => {
                ApiRequest::get(format!("/routes?{}", params.to_query_string()))
            }
            Query::GetBus(id) => ApiRequest::get(format!("/routes/{}", id)),
            Query::RouteStops(id) => ApiRequest::get(format!("/routes/{}/stops", id)),
            Query::RouteStats => ApiRequest::get("/routes/stats"),
            Query::TodayTrips => ApiRequest::get("/routes/today-trips"),
            Query::ListDrivers => ApiRequest::get("/drivers"),
            Query::GetDriver(id) => ApiRequest::get(format!("/drivers/{}", id)),
        }
    }

    /// Tags the result depends on. Lists tag every contained item plus `LIST`.
    pub fn provided_tags(&self, data: Option<&Value>) -> Vec<Tag> {
        match self {
            Query::ListBuses(_) => {
                let routes = data.and_then(|d| d.get("routes"));
                let mut tags = item_tags(TagKind::Route, routes);
                tags.push(Tag::list(TagKind::Route));
                tags
            }
            Query::GetBus(id) => vec![Tag::id(TagKind::Route, id.clone())],
            Query::RouteStops(id) => vec![Tag::id(TagKind::RouteStop, id.clone())],
            Query::RouteStats => vec![Tag::whole(TagKind::RouteStats)],
            Query::TodayTrips => vec![Tag::whole(TagKind::TodayTrips)],
            Query::ListDrivers => {
                let mut tags = item_tags(TagKind::Driver, data);
                tags.push(Tag::list(TagKind::Driver));
                tags
            }
            Query::GetDriver(id) => vec![Tag::id(TagKind::Driver, id.clone())],
        }
    }
}

fn item_tags(kind: TagKind, items: Option<&Value>) -> Vec<Tag> {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("_id"))
                .filter_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(|id| Tag::id(kind, id))
                .collect()
        })
        .unwrap_or_default()
}

/// Write endpoints. Their success invalidates cached reads.
#[derive(Debug, Clone)]
pub enum Mutation {
    CreateBus(CreateBusRequest),
    UpdateBus {
        id: String,
        changes: UpdateBusRequest,
    },
    DeleteBus(String),
    AddRouteStop {
        route_id: String,
        stop: NewRouteStop,
    },
    UpdateRouteStop {
        route_id: String,
        stop_id: String,
        changes: UpdateRouteStopRequest,
    },
    DeleteRouteStop {
        route_id: String,
        stop_id: String,
    },
    AddDriver(AddDriverRequest),
    UpdateDriver {
        id: String,
        changes: UpdateDriverRequest,
    },
    AssignDriver {
        driver_id: String,
        bus_id: String,
    },
    RemoveDriver(String),
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateBus(_) => "createBus",
            Mutation::UpdateBus { .. } => "updateBus",
            Mutation::DeleteBus(_) => "deleteBus",
            Mutation::AddRouteStop { .. } => "addRouteStop",
            Mutation::UpdateRouteStop { .. } => "updateRouteStop",
            Mutation::DeleteRouteStop { .. } => "deleteRouteStop",
            Mutation::AddDriver(_) => "addDriver",
            Mutation::UpdateDriver { .. } => "updateDriver",
            Mutation::AssignDriver { .. } => "assignDriver",
            Mutation::RemoveDriver(_) => "removeDriver",
        }
    }

    pub fn request(&self) -> FleetResult<ApiRequest> {
        let request = match self {
            Mutation::CreateBus(body) => {
                ApiRequest::with_body(Method::POST, "/routes", serde_json::to_value(body)?)
            }
            Mutation::UpdateBus { id, changes } => ApiRequest::with_body(
                Method::PUT,
                format!("/routes/{}", id),
                serde_json::to_value(changes)?,
            ),
            Mutation::DeleteBus(id) => ApiRequest::delete(format!("/routes/{}", id)),
            Mutation::AddRouteStop { route_id, stop } => ApiRequest::with_body(
                Method::POST,
                format!("/routes/{}/stops", route_id),
                serde_json::to_value(stop)?,
            ),
            Mutation::UpdateRouteStop {
                route_id,
                stop_id,
                changes,
            } => ApiRequest::with_body(
                Method::PUT,
                format!("/routes/{}/stops/{}", route_id, stop_id),
                serde_json::to_value(changes)?,
            ),
            Mutation::DeleteRouteStop { route_id, stop_id } => {
                ApiRequest::delete(format!("/routes/{}/stops/{}", route_id, stop_id))
            }
            Mutation::AddDriver(body) => {
                ApiRequest::with_body(Method::POST, "/drivers", serde_json::to_value(body)?)
            }
            Mutation::UpdateDriver { id, changes } => ApiRequest::with_body(
                Method::PUT,
                format!("/drivers/{}", id),
                serde_json::to_value(changes)?,
            ),
            Mutation::AssignDriver { driver_id, bus_id } => ApiRequest::with_body(
                Method::PUT,
                format!("/drivers/{}/assign", driver_id),
                serde_json::to_value(AssignDriverRequest {
                    bus_id: bus_id.clone(),
                })?,
            ),
            Mutation::RemoveDriver(id) => ApiRequest::delete(format!("/drivers/{}", id)),
        };
        Ok(request)
    }

    pub fn invalidates(&self) -> Vec<Tag> {
        match self {
            Mutation::CreateBus(_) | Mutation::DeleteBus(_) => vec![
                Tag::list(TagKind::Route),
                Tag::whole(TagKind::TodayTrips),
                Tag::whole(TagKind::RouteStats),
            ],
            Mutation::UpdateBus { id, .. } => vec![
                Tag::id(TagKind::Route, id.clone()),
                Tag::list(TagKind::Route),
                Tag::whole(TagKind::TodayTrips),
                Tag::whole(TagKind::RouteStats),
            ],
            Mutation::AddRouteStop { route_id, .. }
            | Mutation::UpdateRouteStop { route_id, .. }
            | Mutation::DeleteRouteStop { route_id, .. } => vec![
                Tag::id(TagKind::RouteStop, route_id.clone()),
                Tag::id(TagKind::Route, route_id.clone()),
            ],
            Mutation::AddDriver(_) | Mutation::RemoveDriver(_) => {
                vec![Tag::list(TagKind::Driver)]
            }
            Mutation::UpdateDriver { id, .. } => vec![
                Tag::id(TagKind::Driver, id.clone()),
                Tag::list(TagKind::Driver),
            ],
            Mutation::AssignDriver { driver_id, .. } => vec![
                Tag::id(TagKind::Driver, driver_id.clone()),
                Tag::list(TagKind::Driver),
                Tag::list(TagKind::Route),
            ],
        }
    }
}
