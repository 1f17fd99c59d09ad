// weather_station - Telemetry ingestion service for a weather station
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use serde_json::{json, Map, Value};

pub const TITLE: &str = "Panel Admin Estación Meteorológica";

/// Description of a single public route.
#[derive(Debug)]
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    pub summary: &'static str,
    pub request: &'static str,
    pub success: &'static str,
    pub errors: &'static [u16],
}

pub const ROUTES: &[RouteDoc] = &[
    RouteDoc {
        method: "POST",
        path: "/mediciones",
        summary: "Store a new measurement, timestamped by the server if no timestamp is given",
        request: "precipitacion, velocidad_viento, presion_atmosferica, temperatura, humedad (0-100), optional timestamp",
        success: "the stored measurement including its id",
        errors: &[400, 503],
    },
    RouteDoc {
        method: "GET",
        path: "/mediciones",
        summary: "List up to `limit` measurements (default 100), most recent first",
        request: "optional `limit` query parameter",
        success: "array of measurements",
        errors: &[400, 503],
    },
    RouteDoc {
        method: "DELETE",
        path: "/mediciones",
        summary: "Delete every measurement",
        request: "none",
        success: "{\"deleted\": count}",
        errors: &[503],
    },
    RouteDoc {
        method: "GET",
        path: "/mediciones/ultima",
        summary: "Most recent measurement",
        request: "none",
        success: "a single measurement",
        errors: &[404, 503],
    },
    RouteDoc {
        method: "GET",
        path: "/mediciones/{id}",
        summary: "A single measurement by id",
        request: "none",
        success: "a single measurement",
        errors: &[400, 404, 503],
    },
    RouteDoc {
        method: "PUT",
        path: "/mediciones/{id}",
        summary: "Change only the fields sent, others are left as they are",
        request: "any non-empty subset of the five readings",
        success: "the measurement after the update",
        errors: &[400, 404, 503],
    },
    RouteDoc {
        method: "DELETE",
        path: "/mediciones/{id}",
        summary: "Delete a single measurement",
        request: "none",
        success: "{\"deleted\": true, \"id\": id}",
        errors: &[400, 404, 503],
    },
];

/// Machine readable description of the routes in `ROUTES`, in OpenAPI form.
pub fn openapi() -> Value {
    let mut paths = Map::new();
    for route in ROUTES {
        let mut responses = Map::new();
        responses.insert("200".to_owned(), json!({ "description": route.success }));
        for code in route.errors {
            responses.insert(code.to_string(), json!({ "description": error_description(*code) }));
        }

        let entry = paths
            .entry(route.path.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ops) = entry {
            ops.insert(
                route.method.to_lowercase(),
                json!({
                    "summary": route.summary,
                    "description": route.request,
                    "responses": responses,
                }),
            );
        }
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": TITLE,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
    })
}

/// HTML page listing every route, shown to administrators.
pub fn admin_page() -> String {
    let mut out = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<h1>{}</h1>\n",
        TITLE, TITLE
    );
    out.push_str(&format!(
        "<p>Version {}. Schema at <a href=\"/openapi.json\">/openapi.json</a>.</p>\n",
        env!("CARGO_PKG_VERSION")
    ));
    out.push_str(
        "<table>\n<tr><th>Method</th><th>Path</th><th>Description</th><th>Request</th><th>Success</th><th>Errors</th></tr>\n",
    );

    for route in ROUTES {
        let errors: Vec<String> = route.errors.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!(
            "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            route.method,
            route.path,
            escape(route.summary),
            escape(route.request),
            escape(route.success),
            errors.join(", "),
        ));
    }

    out.push_str("</table>\n</body>\n</html>\n");
    out
}

fn error_description(code: u16) -> &'static str {
    match code {
        400 => "invalid input or identifier",
        401 => "missing or incorrect credentials",
        404 => "no matching measurement",
        503 => "storage unavailable",
        _ => "error",
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_has_every_route() {
        let doc = openapi();
        for route in ROUTES {
            let op = &doc["paths"][route.path][route.method.to_lowercase()];
            assert!(op.is_object(), "missing {} {}", route.method, route.path);
            assert!(op["responses"]["200"].is_object());
        }
    }

    #[test]
    fn test_admin_page_escapes() {
        let page = admin_page();
        assert!(page.contains("/mediciones/ultima"));
        assert!(page.contains("{&quot;deleted&quot;: count}"));
        assert!(!page.contains("{\"deleted\": count}"));
    }

    #[test]
    fn test_admin_page_lists_every_route() {
        let page = admin_page();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(&format!("<h1>{}</h1>", TITLE)));
        assert!(page.contains(env!("CARGO_PKG_VERSION")));
        assert_eq!(ROUTES.len(), page.matches("<tr><td>").count());
        assert!(page.ends_with("</html>\n"));
    }
}
