// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use bookstore_app::{COVER_TYPES, DateFormat, Entity, FieldKey, GENRES, Numeral, Record};
use std::path::PathBuf;
use time::{Date, Duration, Month};

const FIRST_NAMES: [&str; 16] = [
    "Benito", "Emilia", "Rosalía", "Gustavo", "Carmen", "Miguel", "Ana", "Ramón", "Leopoldo",
    "Concepción", "Juan", "Teresa", "Antonio", "Gloria", "Federico", "Elena",
];
const LAST_NAMES: [&str; 18] = [
    "Pérez", "Pardo", "Castro", "Bécquer", "Laforet", "Unamuno", "Matute", "Valle", "Alas",
    "Arenal", "Valera", "Chacel", "Machado", "Fuertes", "García", "Quiroga", "Baroja", "Zambrano",
];

const PUBLISHER_PREFIXES: [&str; 10] = [
    "Ediciones", "Editorial", "Libros", "Prensas", "Talleres", "Casa", "Grupo", "Sello",
    "Imprenta", "Biblioteca",
];
const PUBLISHER_NAMES: [&str; 12] = [
    "del Sur", "Atlántida", "Nueva Era", "Faro", "Cuarzo", "Aurora", "Olmo", "Sirena", "Ámbar",
    "Brújula", "Delta", "Horizonte",
];

const CITIES: [&str; 10] = [
    "Madrid", "Sevilla", "Oviedo", "Bilbao", "Valencia", "Zaragoza", "Málaga", "Vigo", "Murcia",
    "Palma",
];
const STREETS: [&str; 12] = [
    "Calle Mayor",
    "Gran Vía",
    "Paseo del Prado",
    "Calle de Alcalá",
    "Rambla Nova",
    "Calle Real",
    "Avenida de la Paz",
    "Calle Ancha",
    "Plaza Nueva",
    "Calle del Carmen",
    "Ronda Sur",
    "Camino Viejo",
];

const TITLE_NOUNS: [&str; 16] = [
    "casa", "noche", "río", "ciudad", "memoria", "sombra", "viaje", "jardín", "mar", "silencio",
    "puerta", "invierno", "tierra", "voz", "espejo", "camino",
];
const TITLE_ADJECTIVES: [&str; 12] = [
    "larga", "perdida", "blanca", "oscura", "lejana", "dormida", "rota", "secreta", "última",
    "antigua", "quieta", "breve",
];
const BIO_WORDS: [&str; 16] = [
    "novelist", "poet", "essayist", "critic", "translator", "journalist", "playwright", "born",
    "studied", "taught", "wrote", "traveled", "award", "exile", "academy", "stories",
];

const REFERENCE_YEAR: i32 = 2024;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// How many records of each table a generated catalog holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSize {
    pub authors: usize,
    pub publishers: usize,
    pub warehouses: usize,
    pub books: usize,
    pub users: usize,
}

impl Default for CatalogSize {
    fn default() -> Self {
        Self {
            authors: 12,
            publishers: 6,
            warehouses: 4,
            books: 40,
            users: 3,
        }
    }
}

/// Records in save order: every book refers only to authors, publishers and warehouses
/// that come before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub authors: Vec<Record>,
    pub publishers: Vec<Record>,
    pub warehouses: Vec<Record>,
    pub books: Vec<Record>,
    pub users: Vec<Record>,
}

impl Catalog {
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.authors
            .iter()
            .chain(&self.publishers)
            .chain(&self.warehouses)
            .chain(&self.books)
            .chain(&self.users)
    }
}

#[derive(Debug, Clone)]
pub struct BookstoreFaker {
    rng: DeterministicRng,
    date_format: DateFormat,
}

impl BookstoreFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            date_format: DateFormat::default(),
        }
    }

    /// Dates in generated records are written in this layout.
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn author(&mut self, numeral: Numeral) -> Record {
        let name = format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES));
        let bio = self.sentence(4, 9);
        let address = self.address();
        let url = if self.rng.bool() {
            format!("https://{}.example.org", slug(&name))
        } else {
            String::new()
        };
        Record::blank(Entity::Author)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Name, name)
            .with(FieldKey::Address, address)
            .with(FieldKey::Bio, bio)
            .with(FieldKey::Url, url)
    }

    pub fn publisher(&mut self, numeral: Numeral) -> Record {
        let name = format!(
            "{} {}",
            self.pick(&PUBLISHER_PREFIXES),
            self.pick(&PUBLISHER_NAMES)
        );
        let url = format!("https://{}.example.com", slug(&name));
        let address = self.address();
        let phone = self.phone();
        Record::blank(Entity::Publisher)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Name, name)
            .with(FieldKey::Address, address)
            .with(FieldKey::Phone, phone)
            .with(FieldKey::Url, url)
    }

    pub fn warehouse(&mut self, numeral: Numeral) -> Record {
        let city = self.pick(&CITIES);
        let code = format!(
            "{}{}",
            city.chars().take(3).collect::<String>().to_uppercase(),
            numeral
        );
        let address = format!("{}, {city}", self.street());
        let phone = self.phone();
        Record::blank(Entity::Warehouse)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Code, code)
            .with(FieldKey::Address, address)
            .with(FieldKey::Phone, phone)
    }

    pub fn book(
        &mut self,
        numeral: Numeral,
        author: &str,
        publisher: &str,
        warehouses: &[&str],
    ) -> Record {
        let title = self.title();
        let original_title = if self.rng.bool() {
            self.title()
        } else {
            String::new()
        };
        let description = self.sentence(6, 14);
        let isbn = format!(
            "978-84-{:04}-{:03}-{}",
            self.int_range(0, 9999),
            self.int_range(0, 999),
            self.int_range(0, 9)
        );
        let year = self.int_range(1850, i64::from(REFERENCE_YEAR));
        let created = self.date_before_reference();
        let creation_date = self.date_format.format(created);
        let genre = self.pick(&GENRES);
        let cover_type = self.pick(&COVER_TYPES);
        let euros = self.int_range(5, 89);
        let cents = self.int_range(0, 99);
        Record::blank(Entity::Book)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Title, title)
            .with(FieldKey::OriginalTitle, original_title)
            .with(FieldKey::Author, author)
            .with(FieldKey::Description, description)
            .with(FieldKey::Isbn, isbn)
            .with(FieldKey::Year, year.to_string())
            .with(FieldKey::Publisher, publisher)
            .with(FieldKey::CreationDate, creation_date)
            .with(FieldKey::Genre, genre)
            .with(FieldKey::CoverType, cover_type)
            .with(FieldKey::Warehouses, warehouses.join(", "))
            .with(FieldKey::Price, format!("{euros}.{cents:02}"))
    }

    pub fn user(&mut self, numeral: Numeral) -> Record {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let login = format!("{}{numeral}", ascii_letters(first).to_lowercase());
        let level = self.int_range(1, 9);
        let created = self.date_before_reference();
        let creation_date = self.date_format.format(created);
        let password = format!("pw{}", self.int_range(1000, 9999));
        Record::blank(Entity::User)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Login, login)
            .with(FieldKey::UserName, format!("{first} {last}"))
            .with(FieldKey::Level, level.to_string())
            .with(FieldKey::CreationDate, creation_date)
            .with(FieldKey::Password, password)
    }

    /// A consistent catalog with numerals starting at 1 in every table. Names and codes
    /// are unique within their table.
    pub fn catalog(&mut self, size: CatalogSize) -> Catalog {
        let authors = self.unique_records(size.authors, FieldKey::Name, Self::author);
        let publishers = self.unique_records(size.publishers, FieldKey::Name, Self::publisher);
        let warehouses = self.unique_records(size.warehouses, FieldKey::Code, Self::warehouse);
        let users = self.unique_records(size.users, FieldKey::Login, Self::user);

        let mut books = Vec::with_capacity(size.books);
        let mut isbns = Vec::with_capacity(size.books);
        while books.len() < size.books && !authors.is_empty() && !publishers.is_empty() {
            let author = authors[self.rng.int_n(authors.len())].get(FieldKey::Name).to_owned();
            let publisher = publishers[self.rng.int_n(publishers.len())]
                .get(FieldKey::Name)
                .to_owned();
            let stocked = self.rng.int_n(warehouses.len().min(3) + 1);
            let mut codes: Vec<&str> = Vec::with_capacity(stocked);
            for _ in 0..stocked {
                let code = warehouses[self.rng.int_n(warehouses.len())].get(FieldKey::Code);
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            let numeral = Numeral::new(books.len() as i64 + 1);
            let book = self.book(numeral, &author, &publisher, &codes);
            let isbn = book.get(FieldKey::Isbn).to_owned();
            if isbns.contains(&isbn) {
                continue;
            }
            isbns.push(isbn);
            books.push(book);
        }

        Catalog {
            authors,
            publishers,
            warehouses,
            books,
            users,
        }
    }

    fn unique_records(
        &mut self,
        count: usize,
        key: FieldKey,
        make: fn(&mut Self, Numeral) -> Record,
    ) -> Vec<Record> {
        let mut records: Vec<Record> = Vec::with_capacity(count);
        let mut tries = 0;
        while records.len() < count && tries < count * 50 {
            tries += 1;
            let numeral = Numeral::new(records.len() as i64 + 1);
            let record = make(self, numeral);
            if records
                .iter()
                .any(|existing| existing.get(key) == record.get(key))
            {
                continue;
            }
            records.push(record);
        }
        records
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn date_before_reference(&mut self) -> Date {
        let offset = self.int_range(0, 3 * 365);
        reference_date() - Duration::days(offset)
    }

    fn title(&mut self) -> String {
        let noun = self.pick(&TITLE_NOUNS);
        let adjective = self.pick(&TITLE_ADJECTIVES);
        let mut title = format!("La {noun} {adjective}");
        if self.rng.bool() {
            title = format!("{title} de {}", self.pick(&CITIES));
        }
        title
    }

    fn street(&mut self) -> String {
        format!("{} {}", self.pick(&STREETS), self.int_range(1, 180))
    }

    fn address(&mut self) -> String {
        let street = self.street();
        format!("{street}, {}", self.pick(&CITIES))
    }

    fn phone(&mut self) -> String {
        format!(
            "+34 9{:02} {:03} {:03}",
            self.int_range(10, 99),
            self.int_range(0, 999),
            self.int_range(0, 999)
        )
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.int_range(min_words as i64, max_words as i64) as usize;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            parts.push(self.pick(&BIO_WORDS).to_owned());
        }
        let mut sentence = parts.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("bookstore.db");
    Ok((dir, db_path))
}

/// The fixed "today" generated dates count back from.
pub fn reference_date() -> Date {
    Date::from_calendar_date(REFERENCE_YEAR, Month::June, 30).unwrap_or(Date::MIN)
}

fn slug(name: &str) -> String {
    ascii_letters(name).to_lowercase()
}

fn ascii_letters(text: &str) -> String {
    text.chars().filter(char::is_ascii_alphabetic).collect()
}

#[cfg(test)]
mod tests {
    use super::{BookstoreFaker, CatalogSize, reference_date};
    use bookstore_app::{DateFormat, FieldKey, Numeral};
    use std::collections::BTreeSet;

    #[test]
    fn new_deterministic_seed() {
        let mut left = BookstoreFaker::new(42);
        let mut right = BookstoreFaker::new(42);
        assert_eq!(
            left.author(Numeral::new(1)).get(FieldKey::Name),
            right.author(Numeral::new(1)).get(FieldKey::Name)
        );
    }

    #[test]
    fn book_fields_are_in_display_form() {
        let mut faker = BookstoreFaker::new(7);
        let book = faker.book(Numeral::new(3), "Ana Matute", "Editorial Faro", &["MAD1"]);
        let date_format = DateFormat::default();

        assert_eq!(book.get(FieldKey::Numeral), "3");
        assert!(date_format.parse(book.get(FieldKey::CreationDate)).is_ok());
        assert!(book.get(FieldKey::Price).contains('.'));
        assert!(book.get(FieldKey::Isbn).len() <= 17);
        assert_eq!(book.warehouse_codes(), vec!["MAD1".to_owned()]);
    }

    #[test]
    fn dates_never_pass_the_reference_day() {
        let mut faker = BookstoreFaker::new(9);
        let date_format = DateFormat::default();
        for numeral in 1..20 {
            let user = faker.user(Numeral::new(numeral));
            let created = date_format
                .parse(user.get(FieldKey::CreationDate))
                .expect("generated date parses");
            assert!(created <= reference_date());
        }
    }

    #[test]
    fn user_login_is_one_alphanumeric_word() {
        let mut faker = BookstoreFaker::new(11);
        let user = faker.user(Numeral::new(4));
        let login = user.get(FieldKey::Login);
        assert!(login.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic()));
        assert!(login.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }

    #[test]
    fn catalog_keys_are_unique_and_books_reference_known_rows() {
        let mut faker = BookstoreFaker::new(5);
        let catalog = faker.catalog(CatalogSize::default());

        let names = catalog
            .authors
            .iter()
            .map(|author| author.get(FieldKey::Name))
            .collect::<BTreeSet<_>>();
        assert_eq!(names.len(), catalog.authors.len());

        let codes = catalog
            .warehouses
            .iter()
            .map(|warehouse| warehouse.get(FieldKey::Code))
            .collect::<BTreeSet<_>>();
        for book in &catalog.books {
            assert!(names.contains(book.get(FieldKey::Author)));
            for code in book.warehouse_codes() {
                assert!(codes.contains(code.as_str()));
            }
        }
        let isbns = catalog
            .books
            .iter()
            .map(|book| book.get(FieldKey::Isbn))
            .collect::<BTreeSet<_>>();
        assert_eq!(isbns.len(), catalog.books.len());
    }
}
