//! Spending categories and keyword-based category detection.

use serde::{Deserialize, Serialize};

use crate::{EngineError, util::fold_text};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Food,
    Groceries,
    Restaurants,
    Transportation,
    Fuel,
    Utilities,
    Health,
    Education,
    Entertainment,
    Subscriptions,
    Shopping,
    Clothing,
    Rent,
    Taxes,
    Insurance,
    Travel,
    Services,
    Salary,
    Investment,
    Transfer,
    Gifts,
    Pets,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Groceries => "groceries",
            Self::Restaurants => "restaurants",
            Self::Transportation => "transportation",
            Self::Fuel => "fuel",
            Self::Utilities => "utilities",
            Self::Health => "health",
            Self::Education => "education",
            Self::Entertainment => "entertainment",
            Self::Subscriptions => "subscriptions",
            Self::Shopping => "shopping",
            Self::Clothing => "clothing",
            Self::Rent => "rent",
            Self::Taxes => "taxes",
            Self::Insurance => "insurance",
            Self::Travel => "travel",
            Self::Services => "services",
            Self::Salary => "salary",
            Self::Investment => "investment",
            Self::Transfer => "transfer",
            Self::Gifts => "gifts",
            Self::Pets => "pets",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for Category {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(Self::Food),
            "groceries" => Ok(Self::Groceries),
            "restaurants" => Ok(Self::Restaurants),
            "transportation" => Ok(Self::Transportation),
            "fuel" => Ok(Self::Fuel),
            "utilities" => Ok(Self::Utilities),
            "health" => Ok(Self::Health),
            "education" => Ok(Self::Education),
            "entertainment" => Ok(Self::Entertainment),
            "subscriptions" => Ok(Self::Subscriptions),
            "shopping" => Ok(Self::Shopping),
            "clothing" => Ok(Self::Clothing),
            "rent" => Ok(Self::Rent),
            "taxes" => Ok(Self::Taxes),
            "insurance" => Ok(Self::Insurance),
            "travel" => Ok(Self::Travel),
            "services" => Ok(Self::Services),
            "salary" => Ok(Self::Salary),
            "investment" => Ok(Self::Investment),
            "transfer" => Ok(Self::Transfer),
            "gifts" => Ok(Self::Gifts),
            "pets" => Ok(Self::Pets),
            "other" => Ok(Self::Other),
            other => Err(EngineError::InvalidInput(format!(
                "invalid category: {other}"
            ))),
        }
    }
}

// Keywords are stored already folded (see `fold_text`). The table is scanned
// in order, so brand names that would also match a broader bucket
// (`amazon prime` vs `amazon`, `gas station` vs `gas`) come first.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Subscriptions,
        &[
            "netflix",
            "spotify",
            "disney",
            "hbo",
            "youtube premium",
            "amazon prime",
            "icloud",
            "suscripcion",
            "subscription",
        ],
    ),
    (
        Category::Fuel,
        &[
            "nafta",
            "combustible",
            "gasolina",
            "ypf",
            "shell",
            "axion",
            "fuel",
            "gas station",
        ],
    ),
    (
        Category::Salary,
        &["sueldo", "salario", "salary", "aguinaldo", "payroll"],
    ),
    (
        Category::Groceries,
        &[
            "supermercado",
            "super",
            "verduleria",
            "carniceria",
            "almacen",
            "carrefour",
            "coto",
            "groceries",
            "grocery",
        ],
    ),
    (
        Category::Restaurants,
        &[
            "restaurante",
            "restaurant",
            "resto",
            "parrilla",
            "bar",
            "cafe",
            "cafeteria",
        ],
    ),
    (
        Category::Food,
        &[
            "comida",
            "almuerzo",
            "cena",
            "desayuno",
            "delivery",
            "pedidosya",
            "rappi",
            "food",
            "lunch",
            "dinner",
        ],
    ),
    (
        Category::Transportation,
        &[
            "uber",
            "taxi",
            "cabify",
            "colectivo",
            "subte",
            "tren",
            "sube",
            "peaje",
            "estacionamiento",
            "parking",
            "transporte",
            "transport",
            "bus",
        ],
    ),
    (
        Category::Utilities,
        &[
            "luz",
            "agua",
            "gas",
            "electricidad",
            "edenor",
            "edesur",
            "metrogas",
            "aysa",
            "internet",
            "telefono",
            "celular",
            "utilities",
            "electricity",
            "water",
        ],
    ),
    (
        Category::Health,
        &[
            "farmacia",
            "medico",
            "medica",
            "doctor",
            "hospital",
            "clinica",
            "prepaga",
            "osde",
            "swiss medical",
            "dentista",
            "health",
            "pharmacy",
        ],
    ),
    (
        Category::Education,
        &[
            "colegio",
            "escuela",
            "universidad",
            "facultad",
            "curso",
            "cuota escolar",
            "libros",
            "education",
            "school",
            "tuition",
        ],
    ),
    (
        Category::Entertainment,
        &[
            "cine",
            "teatro",
            "recital",
            "concierto",
            "juego",
            "juegos",
            "steam",
            "entertainment",
            "movie",
            "movies",
        ],
    ),
    (
        Category::Clothing,
        &[
            "ropa",
            "zapatillas",
            "indumentaria",
            "clothing",
            "clothes",
            "shoes",
        ],
    ),
    (
        Category::Shopping,
        &[
            "mercadolibre",
            "mercado libre",
            "compra",
            "compras",
            "tienda",
            "amazon",
            "shopping",
        ],
    ),
    (Category::Rent, &["alquiler", "expensas", "rent"]),
    (
        Category::Taxes,
        &[
            "impuesto",
            "impuestos",
            "afip",
            "arba",
            "monotributo",
            "iibb",
            "abl",
            "tax",
            "taxes",
        ],
    ),
    (
        Category::Insurance,
        &["seguro", "seguros", "poliza", "insurance"],
    ),
    (
        Category::Travel,
        &[
            "viaje", "vuelo", "hotel", "airbnb", "pasaje", "travel", "flight",
        ],
    ),
    (
        Category::Services,
        &[
            "plomero",
            "electricista",
            "servicio tecnico",
            "lavanderia",
            "peluqueria",
            "service",
        ],
    ),
    (
        Category::Investment,
        &[
            "inversion",
            "plazo fijo",
            "acciones",
            "cedear",
            "cedears",
            "bitcoin",
            "crypto",
            "fci",
            "investment",
        ],
    ),
    (Category::Transfer, &["transferencia", "transfer"]),
    (
        Category::Gifts,
        &["regalo", "regalos", "donacion", "gift", "gifts"],
    ),
    (
        Category::Pets,
        &["veterinaria", "veterinario", "mascota", "pet", "pets"],
    ),
];

/// Infers a category from free text.
///
/// Matching is case- and accent-insensitive and works on whole words (or
/// whole phrases for multi-word keywords), so `"gastos"` does not match `gas`.
/// Returns `None` when nothing matches; callers fall back to
/// [`Category::Other`].
pub fn detect_category_from_description(description: &str) -> Option<Category> {
    let folded = fold_text(description);
    if folded.is_empty() {
        return None;
    }
    let haystack = format!(" {folded} ");
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| haystack.contains(&format!(" {keyword} ")))
        })
        .map(|(category, _)| *category)
}
