//! Rendu des pages de navigation
//!
//! Deux pages seulement : le listing de répertoire et la fiche de fichier.
//! Tout passe par les gabarits du [`TemplateManager`] ; ce module fabrique
//! les valeurs interpolées (tailles lisibles, dates, fil d'Ariane, balises
//! Open Graph) et la barre d'admin.

use crate::dispatch::{AppState, QueryMap};
use crate::error::ServerError;
use crate::templates::html_escape;
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Timelike, Utc};
use pmoarchive::metadata::{SortKey, TEMPLATE_AUDIO};
use pmoarchive::{DirEntry, EntryId, FileEntry, Snapshot};
use pmoarchive::sort::sort_children;

/// Cookie mémorisant le dernier élément consulté, pour le surlignage.
pub const COOKIE_PREVIOUS_ITEM: &str = "pmoarchive_previous_item";
pub const COOKIE_BEFORE_PREVIOUS_ITEM: &str = "pmoarchive_before_previous_item";
const ITEM_COOKIE_MAX_AGE: u32 = 900;

/// Taille lisible, toujours en mégaoctets comme sur les pages historiques.
pub fn size_string(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Date de contenu pour les listings. Une date à midi pile est réputée
/// approximative : seul le jour est montré.
pub fn modified_string(time: Option<DateTime<Utc>>, short: bool) -> String {
    let Some(time) = time else {
        return String::new();
    };
    if short {
        time.format("%m/%d/%Y").to_string()
    } else if time.hour() == 12 && time.minute() == 0 && time.second() == 0 {
        time.format("%B %-d, %Y").to_string()
    } else {
        time.format("%m/%d/%Y %H:%M:%S UTC").to_string()
    }
}

/// Date de contenu pour la fiche de fichier.
pub fn date_string(file: &FileEntry) -> String {
    if file.metadata.time_approx {
        format!("On {}", file.modified.format("%B %-d, %Y"))
    } else {
        file.modified.format("%m/%d/%Y %H:%M:%S UTC").to_string()
    }
}

/// Durée audio `mm:ss`, ou `hh:mm:ss` à partir d'une heure.
pub fn audio_time(duration_seconds: f64) -> String {
    let total = duration_seconds as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours >= 1 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

fn tags_html(file: &FileEntry) -> String {
    file.metadata
        .tags
        .iter()
        .map(|tag| format!("<div class=\"archive_tag\">{}</div> ", html_escape(tag)))
        .collect()
}

/// Fil d'Ariane HTML ; la racine est figurée par une icône de dossier.
fn breadcrumbs_html(state: &AppState, snapshot: &Snapshot, id: EntryId) -> String {
    let mut html = String::new();
    for crumb in snapshot.breadcrumbs(id) {
        let entry = snapshot.get(crumb);
        let label = match entry.as_dir() {
            Some(dir) if dir.is_root => "<span class=\"material-icons\"> folder </span>".to_string(),
            _ => html_escape(entry.name()),
        };
        if entry.as_dir().is_some() {
            html.push_str(&format!(
                "<div class=\"head_path_item\"><a href=\"{}\">{label}</a></div><div class=\"head_path_divider\">/</div>",
                state.config.public_url(entry.path())
            ));
        } else {
            html.push_str(&format!("<div class=\"head_path_item\">{label}</div>"));
        }
    }
    html
}

/// En-têtes Set-Cookie mémorisant l'élément servi.
fn item_cookies(name: &str, previous: Option<&str>) -> Vec<String> {
    let mut cookies = Vec::new();
    if let Some(previous) = previous {
        cookies.push(format!(
            "{COOKIE_BEFORE_PREVIOUS_ITEM}={}; Max-Age={ITEM_COOKIE_MAX_AGE}; Path=/",
            urlencoding::encode(previous)
        ));
    }
    cookies.push(format!(
        "{COOKIE_PREVIOUS_ITEM}={}; Max-Age={ITEM_COOKIE_MAX_AGE}; Path=/",
        urlencoding::encode(name)
    ));
    cookies
}

fn html_response(body: String, cookies: Vec<String>) -> Response {
    let mut builder = Response::builder().header(CONTENT_TYPE, "text/html; charset=utf-8");
    for cookie in cookies {
        builder = builder.header(SET_COOKIE, cookie);
    }
    builder
        .body(body.into())
        .unwrap_or_else(|_| ().into_response())
}

fn dir_listing_item(
    state: &AppState,
    snapshot: &Snapshot,
    dir: &DirEntry,
    id: EntryId,
    highlighted: bool,
) -> Result<String, ServerError> {
    let count = snapshot.file_count(id);
    state.templates.render(
        "ITEM.DIR",
        &[
            ("ITEM_NAME", html_escape(&dir.name).as_str()),
            ("ITEM_PATH", &state.config.public_url(&dir.path)),
            ("CUSTOM_CLASSES", if highlighted { " aitem_last" } else { "" }),
            ("ITEM_SIZE", &size_string(snapshot.size_of(id))),
            (
                "ITEM_MODIFIED",
                &modified_string(snapshot.last_modified_of(id), false),
            ),
            (
                "ITEM_MODIFIED_SHORT",
                &modified_string(snapshot.last_modified_of(id), true),
            ),
            ("ITEM_COUNT", &count.to_string()),
            ("ITEM_COUNT_LABEL", if count == 1 { "file" } else { "files" }),
        ],
    )
}

fn file_listing_item(
    state: &AppState,
    file: &FileEntry,
    highlighted: bool,
) -> Result<String, ServerError> {
    let duration = match file.duration_seconds() {
        Some(seconds) => audio_time(seconds),
        None => String::new(),
    };
    // Un gabarit par type : ITEM.FILE, ITEM.FILE_AUDIO, ...
    let template = format!("ITEM.{}", file.metadata.template_type);
    let template = if state.templates.has(&template) {
        template
    } else {
        "ITEM.FILE".to_string()
    };
    state.templates.render(
        &template,
        &[
            ("ITEM_NAME", html_escape(&file.name).as_str()),
            ("ITEM_PATH", &state.config.public_url(&file.path)),
            ("CUSTOM_CLASSES", if highlighted { " aitem_last" } else { "" }),
            ("ITEM_SIZE", &size_string(file.size)),
            ("ITEM_MODIFIED", &modified_string(Some(file.modified), false)),
            (
                "ITEM_MODIFIED_SHORT",
                &modified_string(Some(file.modified), true),
            ),
            ("AUDIO_TIME", &duration),
        ],
    )
}

/// Page de listing d'un répertoire.
pub fn directory_page(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    query: &QueryMap,
    previous_item: Option<&str>,
    is_admin: bool,
) -> Result<Response, ServerError> {
    let dir = snapshot
        .dir(id)
        .ok_or_else(|| ServerError::NotFound("not a directory".to_string()))?;

    // Tri demandé, sinon celui déclaré par le répertoire.
    let sort = query
        .get("sort")
        .and_then(|s| s.parse::<SortKey>().ok())
        .unwrap_or(dir.metadata.default_sort);
    let reverse = query
        .get("sort_reverse")
        .map(|v| v == "true")
        .unwrap_or(false);

    let mut body = state.templates.render(
        "PAGE.DIR.PRE_CONTENT",
        &[
            ("FOLDER_TITLE", html_escape(&dir.metadata.title).as_str()),
            (
                "FOLDER_DESCRIPTION",
                &html_escape(&dir.metadata.description),
            ),
            ("URL", &state.config.public_url(&dir.path)),
            ("PATH", &breadcrumbs_html(state, snapshot, id)),
            ("CURRENT_SORT", sort.as_str()),
        ],
    )?;

    if let Some(parent) = dir.parent {
        let parent_path = snapshot.get(parent).path();
        let selected = |key: SortKey| if sort == key { " selected" } else { "" };
        body.push_str(&state.templates.render(
            "ITEM.UP",
            &[
                (
                    "PATH",
                    format!(
                        "{}?last={}",
                        state.config.public_url(parent_path),
                        urlencoding::encode(&dir.name)
                    )
                    .as_str(),
                ),
                ("SELECT_SORT_0", selected(SortKey::Default)),
                ("SELECT_SORT_1", selected(SortKey::FileDate)),
                ("SELECT_SORT_2", selected(SortKey::Name)),
                ("SELECT_SORT_3", selected(SortKey::Size)),
                ("SELECT_SORT_4", selected(SortKey::UploadedDate)),
            ],
        )?);
    }

    let highlight = previous_item.unwrap_or("");
    for child in sort_children(snapshot, &dir.dirs, sort, reverse) {
        if let Some(sub) = snapshot.dir(child) {
            body.push_str(&dir_listing_item(
                state,
                snapshot,
                sub,
                child,
                sub.name == highlight,
            )?);
        }
    }
    for child in sort_children(snapshot, &dir.files, sort, reverse) {
        if let Some(file) = snapshot.file(child) {
            body.push_str(&file_listing_item(state, file, file.name == highlight)?);
        }
    }

    if is_admin {
        body.push_str(&format!(
            "<div class=\"adminbar\"><b>Archive Admin</b> - \
             <a href=\"?action=admin_upload\">[Upload File]</a> \
             <a href=\"?action=admin_audio_editor\">[Edit &amp; Upload Audio]</a> \
             <a href=\"?action=admin_mkdir\">[Create Directory]</a> - \
             <a href=\"?action=admin_modify\">[Modify Directory]</a> \
             <a href=\"?action=admin_delete\">[Delete Directory]</a> - \
             <a href=\"{}/signout\">[Log Out]</a></div>",
            state.config.client_pathname_prefix
        ));
    }

    body.push_str(&state.templates.render(
        "PAGE.DIR.POST_CONTENT",
        &[
            // Le pied de page est du HTML assumé, pas d'échappement.
            ("FOOTER", dir.footer.as_str()),
            (
                "ADMIN_SIGNIN_URL",
                &format!("{}/signin", state.config.client_pathname_prefix),
            ),
        ],
    )?);

    Ok(html_response(body, item_cookies(&dir.name, previous_item)))
}

/// Fiche d'un fichier.
pub fn file_page(
    state: &AppState,
    snapshot: &Snapshot,
    id: EntryId,
    previous_item: Option<&str>,
) -> Result<Response, ServerError> {
    let file = snapshot
        .file(id)
        .ok_or_else(|| ServerError::NotFound("not a file".to_string()))?;
    let parent = snapshot
        .dir(file.parent)
        .ok_or_else(|| ServerError::NotFound("orphan file".to_string()))?;

    let mut metas = String::new();
    let site_path: String = snapshot
        .breadcrumbs(id)
        .iter()
        .filter_map(|&c| snapshot.dir(c))
        .filter(|d| !d.is_root)
        .map(|d| format!(" > {}", html_escape(&d.name)))
        .collect();
    metas.push_str(&format!(
        "<meta property=\"og:site_name\" content=\"PMOArchive{site_path}\">\n"
    ));
    metas.push_str("<meta name=\"theme-color\" content=\"#3882dc\">\n");
    metas.push_str(&format!(
        "<meta property=\"og:title\" content=\"{} (in {})\">\n",
        html_escape(&file.name),
        html_escape(&parent.metadata.title)
    ));
    metas.push_str(&format!(
        "<meta property=\"og:description\" content=\"{} - Recorded {}\n{}\">\n",
        html_escape(&size_string(file.size)),
        html_escape(&date_string(file)),
        html_escape(&file.metadata.description)
    ));
    if file.metadata.template_type == TEMPLATE_AUDIO {
        metas.push_str("<meta name=\"twitter:card\" content=\"summary_large_image\">\n");
        metas.push_str(&format!(
            "<meta name=\"og:image\" content=\"{}?action=audio_meta_preview&amp;thumb_padding=15&amp;thumb_height=100&amp;thumb_fore_color=3882dc&amp;thumb_back_color=202225&amp;thumb_decim=2&amp;thumb_radius=8\">\n",
            html_escape(&state.config.public_url(&file.path))
        ));
    }

    let body = state.templates.render(
        "PAGE.FILE",
        &[
            ("FOLDER_TITLE", html_escape(&parent.metadata.title).as_str()),
            (
                "FOLDER_DESCRIPTION",
                &html_escape(&parent.metadata.description),
            ),
            ("FILE_NAME", &html_escape(&file.name)),
            ("DATE", &html_escape(&date_string(file))),
            ("SIZE", &html_escape(&size_string(file.size))),
            ("FILE_DESCRIPTION", &html_escape(&file.metadata.description)),
            ("TAGS", &tags_html(file)),
            ("URL", &state.config.public_url(&file.path)),
            ("PATH", &breadcrumbs_html(state, snapshot, id)),
            ("META_TAGS", &metas),
        ],
    )?;

    Ok(html_response(body, item_cookies(&file.name, previous_item)))
}
