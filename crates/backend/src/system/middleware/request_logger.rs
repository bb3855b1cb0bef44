use axum::body::to_bytes;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Размер с разделителями тысяч: 1234567 -> 1.234.567
fn format_size(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Middleware для логирования HTTP запросов
///
/// Пишет метод, путь, статус, длительность и размер ответа.
pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    let (parts, body) = response.into_parts();

    // Читаем тело ответа, чтобы узнать реальный размер
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(
                "{} {} -> {} in {}ms (body error: {})",
                method,
                uri.path(),
                parts.status.as_u16(),
                start.elapsed().as_millis(),
                e
            );
            return Response::from_parts(parts, Body::default());
        }
    };

    let status = parts.status.as_u16();
    let elapsed = start.elapsed().as_millis();
    let size = format_size(bytes.len());
    if parts.status.is_success() {
        tracing::info!("{} {} -> {} in {}ms, {} bytes", method, uri.path(), status, elapsed, size);
    } else {
        tracing::warn!("{} {} -> {} in {}ms, {} bytes", method, uri.path(), status, elapsed, size);
    }

    Response::from_parts(parts, Body::from(bytes))
}
