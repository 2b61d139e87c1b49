//! Book catalog management for staff, plus public lookups.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{AppError, AppResult, OptionExt};
use crate::middleware::validation::{
    normalize_isbn, validate_publication_year, validate_required, validate_total_copies,
};
use crate::policy::normalize_page;
use crate::store::books::{self, BookChanges};
use crate::types::{Availability, Book, BookListQuery, CreateBookRequest, Paginated, UpdateBookRequest};

/// Largest page size for catalog listings.
pub const MAX_BOOK_PAGE_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct CatalogService {
    db: SqlitePool,
}

impl CatalogService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Adds a book with all copies available.
    pub async fn create(&self, req: CreateBookRequest) -> AppResult<Book> {
        let req = normalize_new_book(req)?;
        let mut conn = self.db.acquire().await?;
        if books::find_by_isbn(&mut conn, &req.isbn).await?.is_some() {
            return Err(AppError::Conflict("book with this ISBN already exists".into()));
        }
        let book = books::insert(&mut conn, &req, Utc::now()).await?;
        info!(book_id = book.id, isbn = %book.isbn, copies = book.total_copies, "Book created");
        Ok(book)
    }

    pub async fn get(&self, id: i64) -> AppResult<Book> {
        let mut conn = self.db.acquire().await?;
        books::find_by_id(&mut conn, id).await?.ok_or_not_found("book")
    }

    /// Applies the supplied fields. Empty strings and non-positive numbers are ignored.
    ///
    /// Changing `total_copies` shifts `available_copies` by the same amount, never below 0.
    pub async fn update(&self, id: i64, req: UpdateBookRequest) -> AppResult<Book> {
        let changes = normalize_changes(req)?;
        let mut conn = self.db.acquire().await?;
        let book = books::update(&mut conn, id, &changes, Utc::now()).await?.ok_or_not_found("book")?;
        info!(book_id = id, total = book.total_copies, available = book.available_copies, "Book updated");
        Ok(book)
    }

    /// Deletes a book that has no copies out.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let mut conn = self.db.acquire().await?;
        if books::delete_if_idle(&mut conn, id).await? {
            info!(book_id = id, "Book deleted");
            return Ok(());
        }
        match books::find_by_id(&mut conn, id).await? {
            None => Err(AppError::NotFound("book not found".into())),
            Some(_) => Err(AppError::Conflict("cannot delete book with active borrows".into())),
        }
    }

    pub async fn list(&self, query: BookListQuery) -> AppResult<Paginated<Book>> {
        let (page, limit) = normalize_page(query.page, query.limit, MAX_BOOK_PAGE_LIMIT);
        let mut conn = self.db.acquire().await?;
        let (items, total) = books::list(&mut conn, page, limit, query.search.as_deref()).await?;
        Ok(Paginated::new(items, page, limit, total))
    }

    pub async fn check_availability(&self, id: i64) -> AppResult<Availability> {
        let book = self.get(id).await?;
        Ok(Availability {
            book_id: book.id,
            available: book.can_borrow(),
            available_copies: book.available_copies,
            total_copies: book.total_copies,
        })
    }
}

fn normalize_new_book(req: CreateBookRequest) -> AppResult<CreateBookRequest> {
    let isbn = normalize_isbn(&req.isbn)?;
    validate_required(&req.title, "title", 255)?;
    validate_required(&req.author, "author", 255)?;
    if let Some(year) = req.publication_year {
        validate_publication_year(year)?;
    }
    validate_total_copies(req.total_copies)?;

    Ok(CreateBookRequest {
        isbn,
        title: req.title.trim().to_string(),
        author: req.author.trim().to_string(),
        publisher: non_empty(req.publisher),
        publication_year: req.publication_year,
        genre: non_empty(req.genre),
        description: non_empty(req.description),
        total_copies: req.total_copies,
    })
}

fn normalize_changes(req: UpdateBookRequest) -> AppResult<BookChanges> {
    let title = non_empty(req.title);
    if let Some(title) = &title {
        validate_required(title, "title", 255)?;
    }
    let author = non_empty(req.author);
    if let Some(author) = &author {
        validate_required(author, "author", 255)?;
    }
    let publication_year = req.publication_year.filter(|y| *y > 0);
    if let Some(year) = publication_year {
        validate_publication_year(year)?;
    }

    Ok(BookChanges {
        title,
        author,
        publisher: non_empty(req.publisher),
        publication_year,
        genre: non_empty(req.genre),
        description: non_empty(req.description),
        total_copies: req.total_copies.filter(|t| *t > 0),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
