//! Rule tables for every validated endpoint
//!
//! Each request type is a marker implementing [`EndpointKind`]; its table is
//! built once on first use.

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::{FieldMap, FieldValue};

use super::hooks::{CurrentPasswordCheck, RateLimitCheck, SuspiciousContentCheck};
use super::rules::{DimensionBounds, EndpointSpec, FieldSpec, PasswordPolicy, Rule};
use crate::rate_limit::RateLimitAction;

/// A request type with a static rule table.
pub trait EndpointKind: Send + Sync + 'static {
    fn spec() -> &'static EndpointSpec;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared patterns
// ─────────────────────────────────────────────────────────────────────────────

lazy_static! {
    static ref EMAIL_SHAPE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();

    /// Letters, spaces, hyphens, dots and (escaped) apostrophes
    static ref PERSON_NAME: Regex = Regex::new(r"^(?:[a-zA-Z\s\-\.]|&#0?39;)+$").unwrap();

    /// `&` reaches the rules already escaped
    static ref COMPANY_NAME: Regex =
        Regex::new(r"^(?:[a-zA-Z0-9\s\-\.\,\(\)]|&amp;)+$").unwrap();

    static ref PHONE_NUMBER: Regex = Regex::new(r"^[\+]?[0-9\s\-\(\)]+$").unwrap();
    static ref TAX_ID: Regex = Regex::new(r"^[a-zA-Z0-9\-]+$").unwrap();
    static ref OTP: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
    static ref UPC: Regex = Regex::new(r"^[0-9]{12,14}$").unwrap();

    /// `"100"` or `"100-500"`
    static ref RANGE: Regex = Regex::new(r"^\d+(-\d+)?$").unwrap();
}

const BASE_MESSAGES: &[(&str, &str)] = &[("regex", "The :attribute contains invalid characters.")];

const BREACHED_PASSWORD: (&str, &str) = (
    "password.uncompromised",
    "The password has appeared in a data breach. Please choose a different password.",
);

const NAME_CHARACTERS: (&str, &str) = (
    "name.regex",
    "The name may only contain letters, spaces, hyphens, apostrophes, and dots.",
);

fn email_rules(required: bool) -> Vec<Rule> {
    vec![
        if required { Rule::Required } else { Rule::Nullable },
        Rule::Email,
        Rule::Max(255.0),
        Rule::Regex(&EMAIL_SHAPE),
    ]
}

fn with_rules(mut base: Vec<Rule>, extra: Vec<Rule>) -> Vec<Rule> {
    base.extend(extra);
    base
}

fn new_password_rules(extra: Vec<Rule>) -> Vec<Rule> {
    with_rules(
        vec![Rule::Required, Rule::String, Rule::Confirmed],
        with_rules(extra, vec![Rule::Password(PasswordPolicy::strong())]),
    )
}

fn person_name_rules() -> Vec<Rule> {
    vec![
        Rule::String,
        Rule::Min(2.0),
        Rule::Max(100.0),
        Rule::Regex(&PERSON_NAME),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

pub struct LoginRequest;
pub struct RegisterRequest;
pub struct PasswordResetRequest;
pub struct ChangePasswordRequest;
pub struct UpdateProfileRequest;

static LOGIN: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("login")
        .field(FieldSpec::new("email", email_rules(true)))
        .field(FieldSpec::new(
            "password",
            vec![Rule::Required, Rule::String, Rule::Min(1.0), Rule::Max(128.0)],
        ))
        .field(FieldSpec::new("remember", vec![Rule::Nullable, Rule::Boolean]))
        .attribute("email", "email address")
        .attribute("password", "password")
        .messages(BASE_MESSAGES)
        .hook(RateLimitCheck::new(RateLimitAction::Login))
});

static REGISTER: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("register")
        .field(FieldSpec::new(
            "name",
            with_rules(vec![Rule::Required], person_name_rules()),
        ))
        .field(FieldSpec::new(
            "email",
            with_rules(
                email_rules(true),
                vec![Rule::Unique {
                    table: "users",
                    column: "email",
                    ignore_current: false,
                }],
            ),
        ))
        .field(FieldSpec::new("password", new_password_rules(vec![])))
        .field(FieldSpec::new("password_confirmation", vec![Rule::Required, Rule::String]))
        .field(FieldSpec::new(
            "company",
            vec![Rule::Nullable, Rule::String, Rule::Max(255.0)],
        ))
        .field(FieldSpec::new(
            "contact_number",
            vec![Rule::Nullable, Rule::String, Rule::Max(20.0)],
        ))
        .field(FieldSpec::new(
            "tax_id",
            vec![Rule::Nullable, Rule::String, Rule::Max(50.0)],
        ))
        .field(FieldSpec::new(
            "membership_plan_id",
            vec![
                Rule::Nullable,
                Rule::Integer,
                Rule::Exists {
                    table: "membership_plans",
                    column: "id",
                },
            ],
        ))
        .attribute("name", "full name")
        .attribute("email", "email address")
        .attribute("password", "password")
        .attribute("password_confirmation", "password confirmation")
        .messages(BASE_MESSAGES)
        .messages(&[NAME_CHARACTERS, BREACHED_PASSWORD])
        .hook(RateLimitCheck::new(RateLimitAction::Register))
        .hook(SuspiciousContentCheck::registration())
});

static PASSWORD_RESET: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("password_reset")
        .field(FieldSpec::new(
            "otp",
            vec![Rule::Required, Rule::String, Rule::Size(6.0), Rule::Regex(&OTP)],
        ))
        .field(FieldSpec::new("email", email_rules(true)))
        .field(FieldSpec::new("password", new_password_rules(vec![])))
        .field(FieldSpec::new("password_confirmation", vec![Rule::Required, Rule::String]))
        .attribute("otp", "verification code")
        .attribute("email", "email address")
        .attribute("password", "new password")
        .attribute("password_confirmation", "password confirmation")
        .messages(BASE_MESSAGES)
        .messages(&[
            ("otp.regex", "The verification code must be exactly 6 digits."),
            BREACHED_PASSWORD,
        ])
        .hook(RateLimitCheck::new(RateLimitAction::PasswordReset))
});

static CHANGE_PASSWORD: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("change_password")
        .field(FieldSpec::new(
            "current_password",
            vec![Rule::Required, Rule::String, Rule::Max(128.0)],
        ))
        .field(FieldSpec::new(
            "password",
            new_password_rules(vec![Rule::Different("current_password")]),
        ))
        .field(FieldSpec::new("password_confirmation", vec![Rule::Required, Rule::String]))
        .attribute("current_password", "current password")
        .attribute("password", "new password")
        .attribute("password_confirmation", "password confirmation")
        .messages(BASE_MESSAGES)
        .messages(&[
            (
                "password.different",
                "The new password must be different from your current password.",
            ),
            BREACHED_PASSWORD,
        ])
        .hook(CurrentPasswordCheck)
});

static UPDATE_PROFILE: Lazy<EndpointSpec> = Lazy::new(|| {
    static IMAGE_TYPES: &[&str] = &["jpeg", "png", "jpg", "gif"];

    EndpointSpec::new("update_profile")
        .field(FieldSpec::new(
            "name",
            with_rules(vec![Rule::Sometimes, Rule::Required], person_name_rules()),
        ))
        .field(FieldSpec::new(
            "email",
            vec![
                Rule::Sometimes,
                Rule::Required,
                Rule::Email,
                Rule::Max(255.0),
                Rule::Regex(&EMAIL_SHAPE),
                Rule::Unique {
                    table: "users",
                    column: "email",
                    ignore_current: true,
                },
            ],
        ))
        .field(FieldSpec::new(
            "company",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::String,
                Rule::Max(255.0),
                Rule::Regex(&COMPANY_NAME),
            ],
        ))
        .field(FieldSpec::new(
            "contact_number",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::String,
                Rule::Max(20.0),
                Rule::Regex(&PHONE_NUMBER),
            ],
        ))
        .field(FieldSpec::new(
            "tax_id",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::String,
                Rule::Max(50.0),
                Rule::Regex(&TAX_ID),
            ],
        ))
        .field(FieldSpec::new(
            "avatar",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::Image,
                Rule::Mimes(IMAGE_TYPES),
                Rule::Max(2048.0),
                Rule::Dimensions(DimensionBounds {
                    min_width: Some(50),
                    min_height: Some(50),
                    max_width: Some(1000),
                    max_height: Some(1000),
                }),
            ],
        ))
        .attribute("name", "full name")
        .attribute("email", "email address")
        .attribute("company", "company name")
        .attribute("contact_number", "contact number")
        .attribute("tax_id", "tax ID")
        .attribute("avatar", "profile picture")
        .messages(BASE_MESSAGES)
        .messages(&[
            NAME_CHARACTERS,
            ("company.regex", "The company name contains invalid characters."),
            ("contact_number.regex", "The contact number format is invalid."),
            (
                "tax_id.regex",
                "The tax ID may only contain letters, numbers, and hyphens.",
            ),
            (
                "avatar.dimensions",
                "The profile picture must be between 50x50 and 1000x1000 pixels.",
            ),
        ])
        .hook(SuspiciousContentCheck::profile())
});

impl EndpointKind for LoginRequest {
    fn spec() -> &'static EndpointSpec {
        &LOGIN
    }
}

impl EndpointKind for RegisterRequest {
    fn spec() -> &'static EndpointSpec {
        &REGISTER
    }
}

impl EndpointKind for PasswordResetRequest {
    fn spec() -> &'static EndpointSpec {
        &PASSWORD_RESET
    }
}

impl EndpointKind for ChangePasswordRequest {
    fn spec() -> &'static EndpointSpec {
        &CHANGE_PASSWORD
    }
}

impl EndpointKind for UpdateProfileRequest {
    fn spec() -> &'static EndpointSpec {
        &UPDATE_PROFILE
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Edamam proxy
// ─────────────────────────────────────────────────────────────────────────────

const NUTRITION_TYPES: &[&str] = &["cooking", "logging"];

const FOOD_CATEGORIES: &[&str] = &["generic-foods", "packaged-foods", "generic-meals", "fast-foods"];

const HEALTH_LABELS: &[&str] = &[
    "alcohol-cocktail", "alcohol-free", "celery-free", "crustacean-free", "dairy-free", "DASH",
    "egg-free", "fish-free", "fodmap-free", "gluten-free", "immuno-supportive", "keto-friendly",
    "kidney-friendly", "kosher", "low-potassium", "low-sugar", "lupine-free", "Mediterranean",
    "mollusk-free", "mustard-free", "no-oil-added", "paleo", "peanut-free", "pescatarian",
    "pork-free", "red-meat-free", "sesame-free", "shellfish-free", "soy-free", "sugar-conscious",
    "sulfite-free", "tree-nut-free", "vegan", "vegetarian", "wheat-free",
];

const DIET_LABELS: &[&str] = &[
    "balanced", "high-fiber", "high-protein", "low-carb", "low-fat", "low-sodium",
];

const CUISINE_TYPES: &[&str] = &[
    "American", "Asian", "British", "Caribbean", "Central Europe", "Chinese", "Eastern Europe",
    "French", "Indian", "Italian", "Japanese", "Kosher", "Mediterranean", "Mexican",
    "Middle Eastern", "Nordic", "South American", "South East Asian",
];

const MEAL_TYPES: &[&str] = &["Breakfast", "Lunch", "Dinner", "Snack", "Teatime"];

const DISH_TYPES: &[&str] = &[
    "Alcohol-cocktail", "Biscuits and cookies", "Bread", "Cereals", "Condiments and sauces",
    "Desserts", "Drinks", "Egg", "Fats", "Fish", "Ice cream and custard", "Main course", "Meat",
    "Milk", "Pancake", "Pasta", "Pastry", "Pies and tarts", "Pizza", "Preps", "Preserve", "Salad",
    "Sandwiches", "Side dish", "Soup", "Starter", "Sweets",
];

const IMAGE_SIZES: &[&str] = &["THUMBNAIL", "SMALL", "REGULAR", "LARGE"];

const CO2_CLASSES: &[&str] = &["A+", "A", "B", "C", "D", "E", "F", "G"];

fn optional_list(name: &'static str, each: Vec<Rule>) -> FieldSpec {
    FieldSpec::new(name, vec![Rule::Sometimes, Rule::Array]).each(each)
}

fn optional(name: &'static str, rules: Vec<Rule>) -> FieldSpec {
    FieldSpec::new(name, with_rules(vec![Rule::Sometimes], rules))
}

pub struct FoodSearchRequest;
pub struct NutritionAnalysisRequest;
pub struct RecipeSearchRequest;

static FOOD_SEARCH: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("food_search")
        .unsanitized()
        .field(FieldSpec::new(
            "ingr",
            vec![Rule::Required, Rule::String, Rule::Min(1.0), Rule::Max(100.0)],
        ))
        .field(optional("nutrition-type", vec![Rule::String, Rule::In(NUTRITION_TYPES)]))
        .field(optional_list("category", vec![Rule::String, Rule::In(FOOD_CATEGORIES)]))
        .field(optional_list("health", vec![Rule::String, Rule::In(HEALTH_LABELS)]))
        .field(optional_list("nutrients", vec![Rule::String]))
        .field(optional("brand", vec![Rule::String, Rule::Max(100.0)]))
        .field(optional("upc", vec![Rule::String, Rule::Regex(&UPC)]))
        .field(optional(
            "limit",
            vec![Rule::Integer, Rule::Min(1.0), Rule::Max(100.0)],
        ))
        .default_value("limit", 20i64)
        .messages(&[
            ("ingr.required", "Ingredient search term is required."),
            ("ingr.string", "Ingredient search term must be a string."),
            ("ingr.min", "Ingredient search term must be at least 1 character."),
            ("ingr.max", "Ingredient search term cannot exceed 100 characters."),
            (
                "nutrition-type.in",
                "Nutrition type must be either \"cooking\" or \"logging\".",
            ),
            ("category.*.in", "Invalid category provided."),
            ("health.*.in", "Invalid health label provided."),
            ("brand.max", "Brand name cannot exceed 100 characters."),
            ("upc.regex", "UPC must be a valid 12-14 digit code."),
            ("limit.min", "Limit must be at least 1."),
            ("limit.max", "Limit cannot exceed 100."),
        ])
});

static NUTRITION_ANALYSIS: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("nutrition_analysis")
        .unsanitized()
        .field(
            FieldSpec::new("ingredients", vec![Rule::Required, Rule::Array, Rule::Min(1.0)])
                .each(vec![Rule::Required, Rule::String, Rule::Max(500.0)]),
        )
        .field(optional(
            "product_id",
            vec![
                Rule::Integer,
                Rule::Exists {
                    table: "products",
                    column: "id",
                },
            ],
        ))
        .field(optional("nutrition_type", vec![Rule::String, Rule::In(NUTRITION_TYPES)]))
        .field(optional_list("meal_type", vec![Rule::String, Rule::In(MEAL_TYPES)]))
        .field(optional_list("dish_type", vec![Rule::String, Rule::In(DISH_TYPES)]))
        .field(optional("prep", vec![Rule::String, Rule::Max(100.0)]))
        .field(optional("yield", vec![Rule::Integer, Rule::Min(1.0), Rule::Max(100.0)]))
        .field(optional("time", vec![Rule::Integer, Rule::Min(1.0), Rule::Max(1440.0)]))
        .field(optional("img", vec![Rule::Url]))
        .field(optional("thumbnail", vec![Rule::Url]))
        .field(optional("source", vec![Rule::String, Rule::Max(200.0)]))
        .field(optional("url", vec![Rule::Url]))
        .field(optional("label", vec![Rule::String, Rule::Max(200.0)]))
        .field(optional(
            "calories",
            vec![Rule::Integer, Rule::Min(0.0), Rule::Max(10000.0)],
        ))
        .field(optional(
            "glycemic_index",
            vec![Rule::Integer, Rule::Min(0.0), Rule::Max(100.0)],
        ))
        .field(optional("ingredients_text", vec![Rule::String, Rule::Max(2000.0)]))
        .messages(&[
            ("ingredients.required", "At least one ingredient is required."),
            ("ingredients.array", "Ingredients must be provided as an array."),
            ("ingredients.min", "At least one ingredient is required."),
            ("ingredients.*.required", "Each ingredient cannot be empty."),
            ("ingredients.*.string", "Each ingredient must be a string."),
            ("ingredients.*.max", "Each ingredient cannot exceed 500 characters."),
            ("product_id.integer", "Product ID must be a valid integer."),
            ("product_id.exists", "The specified product does not exist."),
            (
                "nutrition_type.in",
                "Nutrition type must be either \"cooking\" or \"logging\".",
            ),
            ("meal_type.*.in", "Invalid meal type provided."),
            ("dish_type.*.in", "Invalid dish type provided."),
            ("yield.min", "Yield must be at least 1."),
            ("yield.max", "Yield cannot exceed 100."),
            ("time.min", "Time must be at least 1 minute."),
            ("time.max", "Time cannot exceed 1440 minutes (24 hours)."),
            ("calories.min", "Calories cannot be negative."),
            ("calories.max", "Calories cannot exceed 10,000."),
            ("glycemic_index.min", "Glycemic index cannot be negative."),
            ("glycemic_index.max", "Glycemic index cannot exceed 100."),
        ])
});

static RECIPE_SEARCH: Lazy<EndpointSpec> = Lazy::new(|| {
    EndpointSpec::new("recipe_search")
        .unsanitized()
        .field(FieldSpec::new(
            "type",
            vec![Rule::Required, Rule::String, Rule::In(&["public", "user"])],
        ))
        .field(optional("q", vec![Rule::String, Rule::Max(200.0)]))
        .field(optional("app_id", vec![Rule::String]))
        .field(optional("app_key", vec![Rule::String]))
        .field(optional_list("diet", vec![Rule::String, Rule::In(DIET_LABELS)]))
        .field(optional_list("health", vec![Rule::String, Rule::In(HEALTH_LABELS)]))
        .field(optional_list("cuisineType", vec![Rule::String, Rule::In(CUISINE_TYPES)]))
        .field(optional_list("mealType", vec![Rule::String, Rule::In(MEAL_TYPES)]))
        .field(optional_list("dishType", vec![Rule::String, Rule::In(DISH_TYPES)]))
        .field(optional("calories", vec![Rule::String, Rule::Regex(&RANGE)]))
        .field(optional("time", vec![Rule::String, Rule::Regex(&RANGE)]))
        .field(optional("imageSize", vec![Rule::String, Rule::In(IMAGE_SIZES)]))
        .field(optional("glycemicIndex", vec![Rule::String, Rule::Regex(&RANGE)]))
        .field(optional_list("nutrients", vec![Rule::String]))
        .field(optional_list("excluded", vec![Rule::String, Rule::Max(100.0)]))
        .field(optional("random", vec![Rule::Boolean]))
        .field(optional("from", vec![Rule::Integer, Rule::Min(0.0), Rule::Max(10000.0)]))
        .field(optional("to", vec![Rule::Integer, Rule::Min(1.0), Rule::Max(100.0)]))
        .field(optional("ingr", vec![Rule::String, Rule::Regex(&RANGE)]))
        .field(optional("uri", vec![Rule::String, Rule::Url]))
        .field(optional("yield", vec![Rule::String, Rule::Regex(&RANGE)]))
        .field(optional_list("tag", vec![Rule::String, Rule::Max(50.0)]))
        .field(optional("co2EmissionsClass", vec![Rule::String, Rule::In(CO2_CLASSES)]))
        .default_value("from", 0i64)
        .default_value("to", 20i64)
        .default_value("imageSize", "REGULAR")
        .messages(&[
            ("type.required", "Recipe type is required."),
            ("type.in", "Recipe type must be either \"public\" or \"user\"."),
            ("q.max", "Search query cannot exceed 200 characters."),
            ("diet.*.in", "Invalid diet type provided."),
            ("health.*.in", "Invalid health label provided."),
            ("cuisineType.*.in", "Invalid cuisine type provided."),
            ("mealType.*.in", "Invalid meal type provided."),
            ("dishType.*.in", "Invalid dish type provided."),
            (
                "calories.regex",
                "Calories must be a number or range (e.g., \"100\" or \"100-500\").",
            ),
            (
                "time.regex",
                "Time must be a number or range in minutes (e.g., \"30\" or \"30-60\").",
            ),
            (
                "imageSize.in",
                "Invalid image size. Must be THUMBNAIL, SMALL, REGULAR, or LARGE.",
            ),
            (
                "glycemicIndex.regex",
                "Glycemic index must be a number or range (e.g., \"50\" or \"50-70\").",
            ),
            ("excluded.*.max", "Each excluded ingredient cannot exceed 100 characters."),
            ("from.min", "From parameter cannot be negative."),
            ("from.max", "From parameter cannot exceed 10,000."),
            ("to.min", "To parameter must be at least 1."),
            ("to.max", "To parameter cannot exceed 100."),
            (
                "ingr.regex",
                "Ingredient count must be a number or range (e.g., \"5\" or \"5-10\").",
            ),
            ("uri.url", "URI must be a valid URL."),
            ("yield.regex", "Yield must be a number or range (e.g., \"4\" or \"4-6\")."),
            ("tag.*.max", "Each tag cannot exceed 50 characters."),
            (
                "co2EmissionsClass.in",
                "Invalid CO2 emissions class. Must be A+, A, B, C, D, E, F, or G.",
            ),
        ])
});

impl EndpointKind for FoodSearchRequest {
    fn spec() -> &'static EndpointSpec {
        &FOOD_SEARCH
    }
}

impl EndpointKind for NutritionAnalysisRequest {
    fn spec() -> &'static EndpointSpec {
        &NUTRITION_ANALYSIS
    }
}

impl EndpointKind for RecipeSearchRequest {
    fn spec() -> &'static EndpointSpec {
        &RECIPE_SEARCH
    }
}

/// Validated recipe search fields minus the caller's Edamam credentials.
pub fn recipe_api_params(validated: &FieldMap) -> FieldMap {
    validated
        .iter()
        .filter(|(key, _)| key.as_str() != "app_id" && key.as_str() != "app_key")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// A recipe search carrying a `uri` asks for one recipe rather than a page.
pub fn is_recipe_detail_request(validated: &FieldMap) -> bool {
    validated
        .get("uri")
        .map(|uri| !uri.is_blank())
        .unwrap_or(false)
}

/// `(from, to)` with the defaults applied.
pub fn pagination_params(validated: &FieldMap) -> (i64, i64) {
    let read = |key: &str, default: i64| match validated.get(key) {
        Some(FieldValue::Integer(n)) => *n,
        _ => default,
    };
    (read("from", 0), read("to", 20))
}
