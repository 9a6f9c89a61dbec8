use super::kymco::Kymco;
use super::moto_it::MotoIt;
use super::pierer;
use super::voge::Voge;
use super::SourceAdapter;

/// Names accepted by `catalog-sync run`
pub const SOURCE_NAMES: [&str; 5] = ["ktm", "husqvarna", "kymco", "voge", "moto-it"];

/// Adapter for a source name, case-insensitive
pub fn adapter_for(name: &str) -> Option<Box<dyn SourceAdapter>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "ktm" => Some(Box::new(pierer::ktm())),
        "husqvarna" => Some(Box::new(pierer::husqvarna())),
        "kymco" => Some(Box::new(Kymco)),
        "voge" => Some(Box::new(Voge)),
        "moto-it" | "motoit" => Some(Box::new(MotoIt)),
        _ => None,
    }
}
