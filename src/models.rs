/// A selectable completion model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

/// Models offered in the selector. The first entry is the default.
pub const MODELS: [ModelInfo; 4] = [
    ModelInfo { id: "models/gemini-2.5-flash", name: "Gemini 2.5 Flash" },
    ModelInfo { id: "models/gemini-3-pro-preview", name: "Gemini 3 Pro" },
    ModelInfo { id: "models/gemini-2.5-flash-lite-latest", name: "Gemini Flash Lite" },
    ModelInfo { id: "models/gemini-1.5-flash", name: "Gemini 1.5 Flash" },
];

pub fn all() -> &'static [ModelInfo] {
    &MODELS
}

pub fn get(index: usize) -> Option<&'static ModelInfo> {
    MODELS.get(index)
}

/// Resolve a catalog entry from either its id or its 1-based position
pub fn find(key: &str) -> Option<usize> {
    let key = key.trim();
    if let Some(i) = MODELS.iter().position(|m| m.id == key) {
        return Some(i);
    }
    // Accept the id without the "models/" prefix as well
    if let Some(i) = MODELS
        .iter()
        .position(|m| m.id.strip_prefix("models/") == Some(key))
    {
        return Some(i);
    }
    key.parse::<usize>()
        .ok()
        .filter(|n| (1..=MODELS.len()).contains(n))
        .map(|n| n - 1)
}
