use crate::server::api;

pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn to_http_string(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_code,
            self.status_text,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

fn json_ok(body: String) -> HttpResponse {
    HttpResponse {
        status_code: 200,
        status_text: "OK",
        content_type: "application/json",
        body,
    }
}

pub fn route_request(method: &str, path: &str, body: &str) -> HttpResponse {
    match (method, path) {
        ("GET", "/") => HttpResponse {
            status_code: 200,
            status_text: "OK",
            content_type: "text/html; charset=utf-8",
            body: index_html(),
        },
        ("GET", "/api/health") => match api::health_payload() {
            Ok(payload) => json_ok(payload),
            Err(err) => error_response(500, "Internal Server Error", &err.to_string()),
        },
        (method, path) if method == "GET" && path.starts_with("/api/tree") => {
            match api::tree_payload(path) {
                Ok(payload) => json_ok(payload),
                Err(err) => error_response(400, "Bad Request", &err),
            }
        }
        (method, path) if method == "GET" && path.starts_with("/api/solve/estimate") => {
            match api::estimate_payload(path) {
                Ok(payload) => json_ok(payload),
                Err(err) => error_response(400, "Bad Request", &err),
            }
        }
        ("POST", "/api/solve") => match api::solve_payload(body) {
            Ok(payload) => json_ok(payload),
            Err(api::SolvePayloadError::Parse(err)) => {
                error_response(400, "Bad Request", &format!("Invalid request body: {err}"))
            }
            Err(api::SolvePayloadError::Validation(validation)) => {
                validation_error_response(400, "Bad Request", validation)
            }
            Err(api::SolvePayloadError::Solve(message)) => {
                error_response(500, "Internal Server Error", &message)
            }
        },
        ("POST", "/api/evaluate") => match api::evaluate_payload(body) {
            Ok(payload) => json_ok(payload),
            Err(api::EvaluatePayloadError::Parse(err)) => {
                error_response(400, "Bad Request", &format!("Invalid request body: {err}"))
            }
            Err(api::EvaluatePayloadError::Run(message)) => {
                error_response(400, "Bad Request", &message)
            }
        },
        _ => error_response(404, "Not Found", "Route not found"),
    }
}

fn validation_error_response(
    status_code: u16,
    status_text: &'static str,
    payload: api::ValidationErrorResponse,
) -> HttpResponse {
    let fallback =
        "{\n  \"status\": \"error\",\n  \"message\": \"Validation failed\"\n}".to_string();

    HttpResponse {
        status_code,
        status_text,
        content_type: "application/json",
        body: serde_json::to_string_pretty(&payload).unwrap_or(fallback),
    }
}

fn error_response(status_code: u16, status_text: &'static str, message: &str) -> HttpResponse {
    HttpResponse {
        status_code,
        status_text,
        content_type: "application/json",
        body: format!(
            "{{\n  \"status\": \"error\",\n  \"message\": {}\n}}",
            serde_json::to_string(message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
        ),
    }
}

fn index_html() -> String {
    r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width,initial-scale=1" />
  <title>Aqueduct Console</title>
  <style>
    body { font-family: Arial, sans-serif; max-width: 820px; margin: 24px auto; padding: 0 12px; }
    .card { border: 1px solid #ddd; border-radius: 8px; padding: 14px; margin: 14px 0; }
    label { display:block; margin: 8px 0 4px; font-weight: 600; }
    input { width: 100%; padding: 8px; box-sizing: border-box; }
    button { margin-top: 12px; padding: 8px 14px; }
    pre { background: #111; color: #9ed8f2; padding: 12px; overflow: auto; border-radius: 6px; min-height: 160px; }
  </style>
</head>
<body>
  <h1>Aqueduct Local API</h1>
  <p>Browser access to the portfolio solve endpoints.</p>

  <div class="card">
    <strong>Health</strong>
    <div><button id="health-btn">GET /api/health</button></div>
  </div>

  <div class="card">
    <strong>Solve</strong>
    <label for="instance">Instance directory</label>
    <input id="instance" value="data/two_stage" />
    <label for="cvar">CVaR weight</label>
    <input id="cvar" type="number" min="0" step="0.1" value="0" />
    <div><button id="solve-btn">POST /api/solve</button></div>
  </div>

  <pre id="output">Ready.</pre>

  <script>
    const output = document.getElementById('output');

    async function request(path, options) {
      output.textContent = 'Loading…';
      const response = await fetch(path, options);
      const text = await response.text();
      output.textContent = 'HTTP ' + response.status + '\n' + text;
    }

    document.getElementById('health-btn').addEventListener('click', () => {
      request('/api/health', { method: 'GET' });
    });

    document.getElementById('solve-btn').addEventListener('click', () => {
      const payload = {
        instance_dir: document.getElementById('instance').value,
        cvar_weight: Number(document.getElementById('cvar').value) || 0,
      };
      request('/api/solve', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify(payload),
      });
    });
  </script>
</body>
</html>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_routes_return_404() {
        let response = route_request("GET", "/api/unknown", "");
        assert_eq!(response.status_code, 404);
        assert!(response.body.contains("Route not found"));
    }

    #[test]
    fn health_route_reports_engine() {
        let response = route_request("GET", "/api/health", "");
        assert_eq!(response.status_code, 200);
        assert!(response.body.contains("\"engine\": \"aqueduct\""));
    }

    #[test]
    fn solve_route_rejects_malformed_bodies() {
        let response = route_request("POST", "/api/solve", "{not json");
        assert_eq!(response.status_code, 400);
        assert!(response.body.contains("Invalid request body"));
    }

    #[test]
    fn tree_route_requires_an_instance() {
        let response = route_request("GET", "/api/tree", "");
        assert_eq!(response.status_code, 400);
        assert!(response.body.contains("instance"));
    }

    #[test]
    fn http_string_carries_content_length() {
        let response = json_ok("{}".to_string());
        let raw = response.to_http_string();
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.contains("Content-Length: 2\r\n"));
    }
}
