use wasm_bindgen::JsCast;

pub(crate) const USERNAME_KEY: &str = "username";

/// One year.
const COOKIE_MAX_AGE_SECS: u32 = 60 * 60 * 24 * 365;

/// Where the chosen display name survives reloads.
pub(crate) trait UsernameStorage {
    fn load(&self) -> Option<String>;
    fn save(&self, username: &str);
    /// Returns whether a stored name was removed.
    fn clear(&self) -> bool;
}

/// Plain-text `username` cookie on the current document.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CookieStorage;

fn html_document() -> Option<web_sys::HtmlDocument> {
    web_sys::window()?
        .document()?
        .dyn_into::<web_sys::HtmlDocument>()
        .ok()
}

pub(crate) fn parse_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        if k != name {
            return None;
        }
        let v = urlencoding::decode(v).ok()?.into_owned();
        (!v.is_empty()).then_some(v)
    })
}

pub(crate) fn format_cookie(name: &str, value: &str, max_age_secs: u32) -> String {
    format!(
        "{name}={}; path=/; max-age={max_age_secs}; SameSite=Lax",
        urlencoding::encode(value)
    )
}

impl UsernameStorage for CookieStorage {
    fn load(&self) -> Option<String> {
        let cookies = html_document()?.cookie().ok()?;
        parse_cookie(&cookies, USERNAME_KEY)
    }

    fn save(&self, username: &str) {
        if let Some(doc) = html_document() {
            let _ = doc.set_cookie(&format_cookie(USERNAME_KEY, username, COOKIE_MAX_AGE_SECS));
        }
    }

    fn clear(&self) -> bool {
        if self.load().is_none() {
            return false;
        }
        match html_document() {
            Some(doc) => doc.set_cookie(&format_cookie(USERNAME_KEY, "", 0)).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryStorage {
    value: std::cell::RefCell<Option<String>>,
}

#[cfg(test)]
impl UsernameStorage for MemoryStorage {
    fn load(&self) -> Option<String> {
        self.value.borrow().clone()
    }

    fn save(&self, username: &str) {
        *self.value.borrow_mut() = Some(username.to_string());
    }

    fn clear(&self) -> bool {
        self.value.borrow_mut().take().is_some()
    }
}

/// The current user's confirmed display name.
///
/// Read once at startup; only the rename flow writes it.
pub(crate) struct UserContext {
    username: String,
    storage: Box<dyn UsernameStorage>,
}

impl UserContext {
    pub fn load(storage: Box<dyn UsernameStorage>) -> Self {
        let username = storage.load().unwrap_or_default();
        Self { username, storage }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn set_username(&mut self, username: &str) {
        self.username = username.to_string();
        self.storage.save(username);
    }
}
