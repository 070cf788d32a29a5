use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Fr,
}

impl Lang {
    pub fn toggled(self) -> Self {
        match self {
            Lang::En => Lang::Fr,
            Lang::Fr => Lang::En,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lang::En => write!(f, "en"),
            Lang::Fr => write!(f, "fr"),
        }
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Lang::En),
            "fr" | "francais" | "français" => Ok(Lang::Fr),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Title,
    ResourceIdLabel,
    MaxRowsLabel,
    DatasetHeader,
    Connecting,
    ErrorMsg,
    NoRecords,
    DownloadFailed,
    RowsFetched,
    Columns,
    EstMemory,
    PreviewHeader,
    FilterLabel,
    FilterCaption,
    ColumnInfo,
    ColName,
    ColNonNull,
    ColNull,
    ColType,
    ColSample,
    DownloadCaption,
    IdleInfo,
    HowToHeader,
    HowToBody,
    ProgressText,
    WarnNoResource,
    CatalogHeader,
    CatalogEmpty,
    StaleResult,
    Cancelled,
}

/// Looks up the display string for `key` in `lang`.
pub fn t(lang: Lang, key: Key) -> &'static str {
    match lang {
        Lang::En => en(key),
        Lang::Fr => fr(key),
    }
}

/// Replaces `{name}` placeholders in a translated template.
pub fn fill(template: &str, args: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Thousands separator, matching the portal's number display.
pub fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn en(key: Key) -> &'static str {
    match key {
        Key::Title => "Montréal Open Data Explorer",
        Key::ResourceIdLabel => "Resource ID",
        Key::MaxRowsLabel => "Max rows to fetch",
        Key::DatasetHeader => "Dataset",
        Key::Connecting => "Connecting to the Montréal Open Data API…",
        Key::ErrorMsg => "Failed to retrieve data. Please verify the Resource ID and try again.",
        Key::NoRecords => "No records found for this Resource ID.",
        Key::DownloadFailed => "Failed to download the original file.",
        Key::RowsFetched => "Rows fetched",
        Key::Columns => "Columns",
        Key::EstMemory => "Est. memory",
        Key::PreviewHeader => "Data Preview",
        Key::FilterLabel => "Filter rows (searches all columns)",
        Key::FilterCaption => "Showing {shown} matching rows out of {total}",
        Key::ColumnInfo => "Column information",
        Key::ColName => "Column",
        Key::ColNonNull => "Non-null",
        Key::ColNull => "Null",
        Key::ColType => "Type",
        Key::ColSample => "Sample",
        Key::DownloadCaption => "File saved as {filename}",
        Key::IdleInfo => "Enter a Resource ID with `fetch <id>` to get started.",
        Key::HowToHeader => "How to find a Resource ID",
        Key::HowToBody => {
            "Go to donnees.montreal.ca, open a dataset, select a resource/file; \
             the Resource ID appears in the page URL: .../resource/<resource-id>"
        }
        Key::ProgressText => "Fetched {fetched} / {total} records…",
        Key::WarnNoResource => "Please enter a Resource ID.",
        Key::CatalogHeader => "Catalog",
        Key::CatalogEmpty => "The catalog could not be loaded.",
        Key::StaleResult => "Discarded the result of a superseded operation.",
        Key::Cancelled => "Fetch cancelled.",
    }
}

fn fr(key: Key) -> &'static str {
    match key {
        Key::Title => "Explorateur – Données ouvertes de Montréal",
        Key::ResourceIdLabel => "Identifiant de ressource",
        Key::MaxRowsLabel => "Nombre max de lignes à récupérer",
        Key::DatasetHeader => "Jeu de données",
        Key::Connecting => "Connexion à l'API de données ouvertes de Montréal…",
        Key::ErrorMsg => {
            "Impossible de récupérer les données. Vérifiez l'identifiant de ressource et réessayez."
        }
        Key::NoRecords => "Aucun enregistrement trouvé pour cet identifiant de ressource.",
        Key::DownloadFailed => "Impossible de télécharger le fichier original.",
        Key::RowsFetched => "Lignes récupérées",
        Key::Columns => "Colonnes",
        Key::EstMemory => "Mémoire estimée",
        Key::PreviewHeader => "Aperçu des données",
        Key::FilterLabel => "Filtrer les lignes (recherche dans toutes les colonnes)",
        Key::FilterCaption => "Affichage de {shown} lignes correspondantes sur {total}",
        Key::ColumnInfo => "Informations sur les colonnes",
        Key::ColName => "Colonne",
        Key::ColNonNull => "Non-nul",
        Key::ColNull => "Nul",
        Key::ColType => "Type",
        Key::ColSample => "Exemple",
        Key::DownloadCaption => "Fichier enregistré sous {filename}",
        Key::IdleInfo => "Entrez un identifiant de ressource avec `fetch <id>` pour commencer.",
        Key::HowToHeader => "Comment trouver un identifiant de ressource",
        Key::HowToBody => {
            "Allez sur donnees.montreal.ca, ouvrez un jeu de données, sélectionnez une \
             ressource; l'identifiant apparaît dans l'URL : .../resource/<identifiant>"
        }
        Key::ProgressText => "Récupéré {fetched} / {total} enregistrements…",
        Key::WarnNoResource => "Veuillez entrer un identifiant de ressource.",
        Key::CatalogHeader => "Catalogue",
        Key::CatalogEmpty => "Le catalogue n'a pas pu être chargé.",
        Key::StaleResult => "Résultat d'une opération remplacée ignoré.",
        Key::Cancelled => "Récupération annulée.",
    }
}
