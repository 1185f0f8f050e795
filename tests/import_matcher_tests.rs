//! Testes da cascata de casamento da importação.
//!
//! O casador é exercitado contra um catálogo em memória que implementa o
//! mesmo contrato `ProductLookup` do repositório real, inclusive a contenção
//! de nome sem sensibilidade a caixa nem a acentos.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use estoque_core::models::import::{InvoiceLineItem, MatchType};
use estoque_core::models::inventory::Product;
use estoque_core::services::{ImportMatcher, ProductLookup};
use estoque_core::AppError;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn product(
    internal_code: &str,
    barcode: Option<&str>,
    import_code: Option<&str>,
    name: &str,
) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4(),
        internal_code: internal_code.to_string(),
        barcode: barcode.map(str::to_string),
        import_code: import_code.map(str::to_string),
        name: name.to_string(),
        description: None,
        cost_price: dec("10.00"),
        sale_price: dec("15.00"),
        units_per_package: Decimal::ONE,
        sell_by_unit: true,
        low_stock_threshold: Decimal::ZERO,
        current_quantity: Decimal::ZERO,
        total_entry: Decimal::ZERO,
        total_exit: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    }
}

fn line(import_code: &str, barcode: Option<&str>, name: &str) -> InvoiceLineItem {
    InvoiceLineItem {
        import_code: import_code.to_string(),
        barcode: barcode.map(str::to_string),
        name: name.to_string(),
        quantity: Decimal::ONE,
        unit_cost: dec("10.00"),
        sale_price: None,
        units_per_package: None,
        sell_by_unit: None,
        purchase_date: None,
        source_reference: None,
    }
}

// Normalização equivalente ao unaccent(upper(...)) usado na consulta SQL.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'A',
            'é' | 'ê' | 'É' | 'Ê' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'O',
            'ú' | 'ü' | 'Ú' | 'Ü' => 'U',
            'ç' | 'Ç' => 'C',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

// Catálogo em memória com a mesma semântica das consultas do repositório.
struct InMemoryCatalog {
    products: Vec<Product>,
}

#[async_trait]
impl ProductLookup for InMemoryCatalog {
    async fn find_by_import_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        Ok(self
            .products
            .iter()
            .find(|p| p.import_code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, AppError> {
        Ok(self
            .products
            .iter()
            .find(|p| p.barcode.as_deref() == Some(barcode))
            .cloned())
    }

    async fn find_by_internal_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        Ok(self
            .products
            .iter()
            .find(|p| p.internal_code == code)
            .cloned())
    }

    async fn find_by_name_exact(&self, name: &str) -> Result<Option<Product>, AppError> {
        Ok(self.products.iter().find(|p| p.name == name).cloned())
    }

    async fn find_by_name_containing(&self, name: &str) -> Result<Option<Product>, AppError> {
        let needle = normalize(name);
        Ok(self
            .products
            .iter()
            .find(|p| {
                let candidate = normalize(&p.name);
                needle.contains(&candidate) || candidate.contains(&needle)
            })
            .cloned())
    }
}

fn matcher(products: Vec<Product>) -> ImportMatcher<InMemoryCatalog> {
    ImportMatcher::new(InMemoryCatalog { products })
}

// O produto de referência dos cenários: P100 / 7891234500000 / Filtro de Óleo.
fn filtro_de_oleo() -> Product {
    product(
        "P100",
        Some("7891234500000"),
        Some("P100"),
        "Filtro de Óleo",
    )
}

#[tokio::test]
async fn casa_por_codigo_de_importacao_mesmo_com_resto_divergente() {
    let m = matcher(vec![filtro_de_oleo()]);

    let (matched, match_type) = m
        .resolve(&line("P100", Some("0000000000000"), "Outro Nome Qualquer"))
        .await
        .unwrap();

    assert_eq!(matched.unwrap().internal_code, "P100");
    assert_eq!(match_type, Some(MatchType::ImportCode));
}

#[tokio::test]
async fn casa_por_codigo_de_barras_quando_o_codigo_da_nota_e_outro() {
    let m = matcher(vec![filtro_de_oleo()]);

    let (matched, match_type) = m
        .resolve(&line("XYZ-999", Some("7891234500000"), "Outro Nome"))
        .await
        .unwrap();

    assert_eq!(matched.unwrap().internal_code, "P100");
    assert_eq!(match_type, Some(MatchType::Barcode));
}

#[tokio::test]
async fn casa_por_codigo_interno_quando_nao_ha_codigo_de_importacao() {
    // Produto cadastrado à mão, sem import_code: o código do item da nota é
    // tentado como código interno.
    let m = matcher(vec![product("P200", None, None, "Correia Dentada")]);

    let (matched, match_type) = m.resolve(&line("P200", None, "Correia")).await.unwrap();

    assert_eq!(matched.unwrap().internal_code, "P200");
    assert_eq!(match_type, Some(MatchType::InternalCode));
}

#[tokio::test]
async fn casa_por_contencao_de_nome_sem_acentos_nem_caixa() {
    let m = matcher(vec![filtro_de_oleo()]);

    let (matched, match_type) = m
        .resolve(&line("ZZZ-1", None, "FILTRO DE OLEO XYZ"))
        .await
        .unwrap();

    assert_eq!(matched.unwrap().internal_code, "P100");
    assert_eq!(match_type, Some(MatchType::Name));
}

#[tokio::test]
async fn igualdade_exata_de_nome_vence_a_contencao() {
    let exact = product("P300", None, None, "Filtro");
    let contains = product("P301", None, None, "Filtro de Óleo Premium");
    let m = matcher(vec![contains, exact]);

    let (matched, match_type) = m.resolve(&line("NOVO-1", None, "Filtro")).await.unwrap();

    assert_eq!(matched.unwrap().internal_code, "P300");
    assert_eq!(match_type, Some(MatchType::Name));
}

#[tokio::test]
async fn codigo_de_importacao_tem_precedencia_sobre_barras() {
    let by_import = product("A1", None, Some("P100"), "Produto A");
    let by_barcode = product("B1", Some("7891234500000"), None, "Produto B");
    let m = matcher(vec![by_barcode, by_import]);

    let (matched, match_type) = m
        .resolve(&line("P100", Some("7891234500000"), "Produto"))
        .await
        .unwrap();

    assert_eq!(matched.unwrap().internal_code, "A1");
    assert_eq!(match_type, Some(MatchType::ImportCode));
}

#[tokio::test]
async fn barras_curto_ou_marcador_nao_entra_na_cascata() {
    // Mesmo que algum cadastro tenha o marcador gravado por engano, a cascata
    // não casa por ele.
    let bogus = product("B2", Some("SEM GTIN"), None, "Produto B");
    let m = matcher(vec![bogus]);

    let (matched, match_type) = m
        .resolve(&line("NOVO-2", Some("SEM GTIN"), "Produto inexistente"))
        .await
        .unwrap();

    assert!(matched.is_none());
    assert_eq!(match_type, None);

    let short = product("B3", Some("123"), None, "Produto C");
    let m = matcher(vec![short]);
    let (matched, _) = m
        .resolve(&line("NOVO-3", Some("123"), "Outro inexistente"))
        .await
        .unwrap();
    assert!(matched.is_none());
}

#[tokio::test]
async fn sem_casamento_devolve_vazio_sem_erro() {
    let m = matcher(vec![filtro_de_oleo()]);

    let (matched, match_type) = m
        .resolve(&line("NOVO-4", Some("7890000000001"), "Parafuso Sextavado"))
        .await
        .unwrap();

    assert!(matched.is_none());
    assert_eq!(match_type, None);
}
