use std::path::Path;

use serde_json::json;
use tiny_ejs::{DirLoader, Options, ScriptEvaluator, Template, compile};

fn page_template(loader: &DirLoader) -> Template {
    let source = loader.reader()("page.ejs").expect("failed to read page.ejs");
    compile(
        &source,
        Options::new(ScriptEvaluator::new())
            .filename("page.ejs")
            .locals(["title", "items"])
            .read(loader.reader())
            .resolve(loader.resolver()),
    )
    .expect("failed to compile page.ejs")
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
    let loader = DirLoader::new(&root);
    for name in loader.templates() {
        log::info!("found template {name}");
    }

    let template = page_template(&loader);
    let html = template
        .render(&json!({
            "title": "Todos",
            "items": ["write a template engine", "render this page"],
        }))
        .expect("failed to render page.ejs");
    println!("{html}");

    let inline = compile(
        "<p>Hello <%= locals.firstname %> <%= locals.lastname %></p>",
        Options::new(ScriptEvaluator::new()),
    )
    .expect("failed to compile the inline template");
    let html = inline
        .render(&json!({"firstname": "King", "lastname": "Tubby"}))
        .expect("failed to render the inline template");
    println!("{html}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_page_renders_with_its_partials() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let template = page_template(&DirLoader::new(&root));
        let html = template
            .render(&json!({"title": "Todos", "items": ["one", "two"]}))
            .unwrap();
        assert!(html.contains("<h1>Todos</h1>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("<li>two</li>"));
        assert!(html.contains("<footer>generated for Todos</footer>"));
    }

    #[test]
    fn the_loader_sees_every_template() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let names = DirLoader::new(&root).templates();
        assert_eq!(
            names,
            vec!["page.ejs", "partials/footer.ejs", "partials/list.ejs"]
        );
    }
}
