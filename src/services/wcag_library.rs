//! Static catalogue of WCAG rules with German explanations and BITV references.
//!
//! Scan findings reference rules by `id`. The rule endpoints serve the
//! catalogue to the UI, and the statement generator resolves rule ids in
//! known barriers to their success criterion and fix.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    A,
    AA,
    AAA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WcagRule {
    pub id: &'static str,
    /// WCAG success criterion, e.g. `1.1.1`
    pub criterion: &'static str,
    pub level: Level,
    /// BITV 2.0 / EN 301 549 clause
    pub bitv: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub fix: &'static str,
}

pub const RULES: &[WcagRule] = &[
    WcagRule {
        id: "image-alt",
        criterion: "1.1.1",
        level: Level::A,
        bitv: "9.1.1.1",
        title: "Bilder ohne Alternativtext",
        description: "Informative Bilder benötigen einen Alternativtext, damit Screenreader den Inhalt wiedergeben können.",
        fix: "Ergänzen Sie ein aussagekräftiges alt-Attribut. Dekorative Bilder erhalten alt=\"\".",
    },
    WcagRule {
        id: "video-caption",
        criterion: "1.2.2",
        level: Level::A,
        bitv: "9.1.2.2",
        title: "Videos ohne Untertitel",
        description: "Aufgezeichnete Videos mit Ton benötigen synchronisierte Untertitel.",
        fix: "Stellen Sie eine Untertitelspur (<track kind=\"captions\">) bereit.",
    },
    WcagRule {
        id: "heading-order",
        criterion: "1.3.1",
        level: Level::A,
        bitv: "9.1.3.1",
        title: "Übersprungene Überschriftenebenen",
        description: "Überschriften müssen eine logische Hierarchie bilden, damit die Seitenstruktur erfassbar ist.",
        fix: "Verwenden Sie Überschriften in absteigender Reihenfolge ohne Ebenen auszulassen (h1, h2, h3 ...).",
    },
    WcagRule {
        id: "table-headers",
        criterion: "1.3.1",
        level: Level::A,
        bitv: "9.1.3.1",
        title: "Datentabellen ohne Kopfzellen",
        description: "Datentabellen benötigen Kopfzellen, damit Zellen ihren Spalten und Zeilen zugeordnet werden können.",
        fix: "Kennzeichnen Sie Kopfzellen mit <th> und ergänzen Sie bei Bedarf scope-Attribute.",
    },
    WcagRule {
        id: "label",
        criterion: "1.3.1",
        level: Level::A,
        bitv: "9.1.3.1",
        title: "Formularfelder ohne Beschriftung",
        description: "Eingabefelder benötigen eine programmatisch verknüpfte Beschriftung.",
        fix: "Verknüpfen Sie ein <label for=\"...\"> mit dem Feld oder nutzen Sie aria-label bzw. aria-labelledby.",
    },
    WcagRule {
        id: "autocomplete-valid",
        criterion: "1.3.5",
        level: Level::AA,
        bitv: "9.1.3.5",
        title: "Fehlender Eingabezweck",
        description: "Felder für persönliche Daten sollen ihren Zweck über autocomplete bekannt geben.",
        fix: "Setzen Sie passende autocomplete-Werte wie name, email oder street-address.",
    },
    WcagRule {
        id: "color-contrast",
        criterion: "1.4.3",
        level: Level::AA,
        bitv: "9.1.4.3",
        title: "Unzureichender Farbkontrast",
        description: "Text muss ein Kontrastverhältnis von mindestens 4,5:1 (großer Text 3:1) aufweisen.",
        fix: "Passen Sie Vorder- oder Hintergrundfarbe an, bis das Kontrastverhältnis erreicht ist.",
    },
    WcagRule {
        id: "meta-viewport",
        criterion: "1.4.4",
        level: Level::AA,
        bitv: "9.1.4.4",
        title: "Zoom ist deaktiviert",
        description: "Nutzende müssen Inhalte auf 200 % vergrößern können; user-scalable=no oder maximum-scale verhindern das.",
        fix: "Entfernen Sie user-scalable=no und maximum-scale-Werte unter 2 aus dem viewport-Meta-Tag.",
    },
    WcagRule {
        id: "reflow",
        criterion: "1.4.10",
        level: Level::AA,
        bitv: "9.1.4.10",
        title: "Inhalte brechen nicht um",
        description: "Inhalte müssen bei 320 CSS-Pixel Breite ohne horizontales Scrollen nutzbar sein.",
        fix: "Verwenden Sie responsive Layouts und vermeiden Sie feste Breiten.",
    },
    WcagRule {
        id: "non-text-contrast",
        criterion: "1.4.11",
        level: Level::AA,
        bitv: "9.1.4.11",
        title: "Geringer Kontrast von Bedienelementen",
        description: "Grafische Bedienelemente und Zustände benötigen einen Kontrast von mindestens 3:1.",
        fix: "Erhöhen Sie den Kontrast von Rahmen, Icons und Fokusindikatoren.",
    },
    WcagRule {
        id: "keyboard",
        criterion: "2.1.1",
        level: Level::A,
        bitv: "9.2.1.1",
        title: "Nicht per Tastatur bedienbar",
        description: "Alle Funktionen müssen ohne Maus über die Tastatur erreichbar sein.",
        fix: "Nutzen Sie native Bedienelemente oder ergänzen Sie tabindex und Tastatur-Handler.",
    },
    WcagRule {
        id: "bypass",
        criterion: "2.4.1",
        level: Level::A,
        bitv: "9.2.4.1",
        title: "Keine Sprungmarke zum Inhalt",
        description: "Wiederkehrende Blöcke wie die Navigation müssen übersprungen werden können.",
        fix: "Ergänzen Sie einen \"Zum Inhalt springen\"-Link oder Landmark-Regionen.",
    },
    WcagRule {
        id: "document-title",
        criterion: "2.4.2",
        level: Level::A,
        bitv: "9.2.4.2",
        title: "Seitentitel fehlt",
        description: "Jede Seite benötigt einen aussagekräftigen <title>.",
        fix: "Vergeben Sie einen eindeutigen Seitentitel, der Inhalt oder Zweck beschreibt.",
    },
    WcagRule {
        id: "link-name",
        criterion: "2.4.4",
        level: Level::A,
        bitv: "9.2.4.4",
        title: "Links ohne erkennbares Ziel",
        description: "Der Zweck eines Links muss aus dem Linktext oder seinem Kontext hervorgehen.",
        fix: "Geben Sie Links einen sichtbaren Text oder ein aria-label; Bild-Links benötigen einen Alternativtext.",
    },
    WcagRule {
        id: "focus-visible",
        criterion: "2.4.7",
        level: Level::AA,
        bitv: "9.2.4.7",
        title: "Fokus nicht sichtbar",
        description: "Der Tastaturfokus muss jederzeit sichtbar sein.",
        fix: "Entfernen Sie outline: none oder ersetzen Sie es durch einen gut sichtbaren Fokusstil.",
    },
    WcagRule {
        id: "target-size",
        criterion: "2.5.8",
        level: Level::AA,
        bitv: "9.2.5.8",
        title: "Zu kleine Zielflächen",
        description: "Klickbare Ziele sollen mindestens 24 × 24 CSS-Pixel groß sein.",
        fix: "Vergrößern Sie Schaltflächen und Links oder erhöhen Sie den Abstand zwischen ihnen.",
    },
    WcagRule {
        id: "html-has-lang",
        criterion: "3.1.1",
        level: Level::A,
        bitv: "9.3.1.1",
        title: "Sprache der Seite nicht angegeben",
        description: "Die Hauptsprache muss im lang-Attribut des html-Elements angegeben sein.",
        fix: "Setzen Sie <html lang=\"de\"> bzw. den passenden Sprachcode.",
    },
    WcagRule {
        id: "error-identification",
        criterion: "3.3.1",
        level: Level::A,
        bitv: "9.3.3.1",
        title: "Fehler werden nicht benannt",
        description: "Eingabefehler müssen erkannt und in Textform beschrieben werden.",
        fix: "Geben Sie Fehlermeldungen als Text aus und verknüpfen Sie sie mit aria-describedby.",
    },
    WcagRule {
        id: "duplicate-id",
        criterion: "4.1.1",
        level: Level::A,
        bitv: "9.4.1.1",
        title: "Doppelte IDs",
        description: "Doppelte id-Attribute stören Beschriftungen und ARIA-Verknüpfungen.",
        fix: "Vergeben Sie jede id nur einmal pro Seite.",
    },
    WcagRule {
        id: "button-name",
        criterion: "4.1.2",
        level: Level::A,
        bitv: "9.4.1.2",
        title: "Schaltflächen ohne Namen",
        description: "Schaltflächen benötigen einen zugänglichen Namen, damit ihr Zweck angesagt wird.",
        fix: "Ergänzen Sie Text, aria-label oder einen Alternativtext für Icon-Schaltflächen.",
    },
    WcagRule {
        id: "status-messages",
        criterion: "4.1.3",
        level: Level::AA,
        bitv: "9.4.1.3",
        title: "Statusmeldungen werden nicht angesagt",
        description: "Statusmeldungen müssen Hilfsmitteln ohne Fokuswechsel mitgeteilt werden.",
        fix: "Verwenden Sie role=\"status\" oder aria-live für dynamische Meldungen.",
    },
];

pub fn find(id: &str) -> Option<&'static WcagRule> {
    RULES.iter().find(|rule| rule.id == id)
}

/// Filter rules by maximum conformance level and a case-insensitive search term.
///
/// `max_level = AA` returns A and AA rules, matching how conformance targets work.
pub fn search(max_level: Option<Level>, query: Option<&str>) -> Vec<&'static WcagRule> {
    let query = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    RULES
        .iter()
        .filter(|rule| max_level.is_none_or(|max| rule.level <= max))
        .filter(|rule| match &query {
            Some(q) => {
                rule.id.contains(q.as_str())
                    || rule.criterion.starts_with(q.as_str())
                    || rule.title.to_lowercase().contains(q.as_str())
                    || rule.description.to_lowercase().contains(q.as_str())
            }
            None => true,
        })
        .collect()
}
