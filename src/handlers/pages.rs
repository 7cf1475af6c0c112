//! Server-rendered page shells. Each shell loads the shared client script,
//! which fetches JSON from `/api` and renders the page body.

use axum::{response::Html, routing::get, Router};

#[derive(Debug)]
pub struct Page {
    pub path: &'static str,
    /// `data-page` key the client script dispatches on
    pub key: &'static str,
    pub title: &'static str,
    pub in_nav: bool,
}

pub const PAGES: &[Page] = &[
    Page {
        path: "/",
        key: "home",
        title: "Inicio",
        in_nav: true,
    },
    Page {
        path: "/login",
        key: "login",
        title: "Iniciar sesión",
        in_nav: false,
    },
    Page {
        path: "/orders",
        key: "orders",
        title: "Órdenes de compra",
        in_nav: true,
    },
    Page {
        path: "/suppliers",
        key: "suppliers",
        title: "Proveedores",
        in_nav: true,
    },
    Page {
        path: "/cost-centers",
        key: "cost-centers",
        title: "Centros de costo",
        in_nav: true,
    },
    Page {
        path: "/budgets",
        key: "budgets",
        title: "Presupuestos",
        in_nav: true,
    },
    Page {
        path: "/control-panel",
        key: "control-panel",
        title: "Panel de control",
        in_nav: true,
    },
];

fn render_nav(current: &Page) -> String {
    PAGES
        .iter()
        .filter(|page| page.in_nav)
        .map(|page| {
            let class = if page.key == current.key { " class=\"active\"" } else { "" };
            format!("<a href=\"{}\"{}>{}</a>", page.path, class, page.title)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_shell(page: &Page) -> String {
    let nav = if page.in_nav {
        format!(
            "<nav class=\"topnav\">\n<span class=\"brand\">BuyTrack</span>\n{}\n<button id=\"logout\" type=\"button\">Salir</button>\n</nav>",
            render_nav(page)
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | BuyTrack</title>
<link rel="stylesheet" href="/static/css/app.css">
</head>
<body data-page="{key}">
{nav}
<main id="app">
<h1>{title}</h1>
<div id="content"></div>
</main>
<div id="toast" role="status" hidden></div>
<script src="/static/js/app.js" defer></script>
</body>
</html>
"#,
        title = page.title,
        key = page.key,
        nav = nav,
    )
}

pub fn page_routes() -> Router {
    PAGES.iter().fold(Router::new(), |router, page| {
        router.route(page.path, get(move || async move { Html(render_shell(page)) }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_marks_current_page() {
        let orders = PAGES.iter().find(|p| p.key == "orders").unwrap();
        let html = render_shell(orders);
        assert!(html.contains("data-page=\"orders\""));
        assert!(html.contains("<a href=\"/orders\" class=\"active\">"));
        assert!(html.contains("/static/js/app.js"));
    }

    #[test]
    fn login_has_no_navigation() {
        let login = PAGES.iter().find(|p| p.key == "login").unwrap();
        assert!(!render_shell(login).contains("topnav"));
    }
}
