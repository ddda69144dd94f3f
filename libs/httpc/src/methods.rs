//! Format shortcuts on [`HttpClient`]: send a request and decode the body in
//! one call.
//!
//! None of them check the status; a non-2xx body is decoded like any other,
//! which normally surfaces as a decode error. Use the request builder with
//! [`HttpResponse::error_for_status`](crate::HttpResponse::error_for_status)
//! when the status matters.

use crate::client::HttpClient;
use crate::context::RequestContext;
use crate::error::HttpError;
use crate::request::{RequestBuilder, RequestOption};
use serde::Serialize;
use serde::de::DeserializeOwned;

impl HttpClient {
    /// GET `url` and decode the body as JSON
    ///
    /// # Errors
    /// Returns the request error or `HttpError::Json`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &[RequestOption],
    ) -> Result<T, HttpError> {
        let mut resp = self.get(url).apply_all(options).send().await?;
        resp.json().await
    }

    /// [`get_json`](Self::get_json) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error or `HttpError::Json`.
    pub async fn get_json_with_context<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: &str,
        options: &[RequestOption],
    ) -> Result<T, HttpError> {
        let mut resp = self
            .get_with_context(ctx, url)
            .apply_all(options)
            .send()
            .await?;
        resp.json().await
    }

    /// GET `url` and decode the body as XML
    ///
    /// # Errors
    /// Returns the request error or `HttpError::Xml`.
    pub async fn get_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &[RequestOption],
    ) -> Result<T, HttpError> {
        let mut resp = self.get(url).apply_all(options).send().await?;
        resp.xml().await
    }

    /// [`get_xml`](Self::get_xml) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error or `HttpError::Xml`.
    pub async fn get_xml_with_context<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: &str,
        options: &[RequestOption],
    ) -> Result<T, HttpError> {
        let mut resp = self
            .get_with_context(ctx, url)
            .apply_all(options)
            .send()
            .await?;
        resp.xml().await
    }

    /// GET `url` and decode the comma-separated body, one `T` per data row
    ///
    /// # Errors
    /// Returns the request error or `HttpError::Csv`.
    pub async fn get_csv<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &[RequestOption],
    ) -> Result<Vec<T>, HttpError> {
        self.get_csv_with_separator(url, b',', options).await
    }

    /// [`get_csv`](Self::get_csv) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error or `HttpError::Csv`.
    pub async fn get_csv_with_context<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: &str,
        options: &[RequestOption],
    ) -> Result<Vec<T>, HttpError> {
        decode_csv(self.get_with_context(ctx, url).apply_all(options), b',').await
    }

    /// [`get_csv`](Self::get_csv) with another field separator, e.g. `b'\t'`
    ///
    /// # Errors
    /// Returns the request error or `HttpError::Csv`.
    pub async fn get_csv_with_separator<T: DeserializeOwned>(
        &self,
        url: &str,
        separator: u8,
        options: &[RequestOption],
    ) -> Result<Vec<T>, HttpError> {
        decode_csv(self.get(url).apply_all(options), separator).await
    }

    /// [`get_csv_with_separator`](Self::get_csv_with_separator) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error or `HttpError::Csv`.
    pub async fn get_csv_with_separator_and_context<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: &str,
        separator: u8,
        options: &[RequestOption],
    ) -> Result<Vec<T>, HttpError> {
        decode_csv(self.get_with_context(ctx, url).apply_all(options), separator).await
    }

    /// POST `body` as JSON (no body when `None`) and decode the response
    /// into `target`. With no target the response body is left unread.
    ///
    /// ```ignore
    /// let mut created = User::default();
    /// client.post_json("/users", Some(&new_user), Some(&mut created), &[]).await?;
    /// client.post_json::<_, ()>("/users/42/ping", None::<&()>, None, &[]).await?;
    /// ```
    ///
    /// # Errors
    /// Returns the request error or `HttpError::Json` for either direction.
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        body: Option<&B>,
        target: Option<&mut T>,
        options: &[RequestOption],
    ) -> Result<(), HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        exchange_json(self.post(url).apply_all(options), body, target).await
    }

    /// [`post_json`](Self::post_json) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error or `HttpError::Json`.
    pub async fn post_json_with_context<B, T>(
        &self,
        ctx: &RequestContext,
        url: &str,
        body: Option<&B>,
        target: Option<&mut T>,
        options: &[RequestOption],
    ) -> Result<(), HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        exchange_json(
            self.post_with_context(ctx, url).apply_all(options),
            body,
            target,
        )
        .await
    }

    /// POST `body` as XML (no body when `None`) and decode the response into
    /// `target`
    ///
    /// # Errors
    /// Returns the request error, `HttpError::XmlEncode` or `HttpError::Xml`.
    pub async fn post_xml<B, T>(
        &self,
        url: &str,
        body: Option<&B>,
        target: Option<&mut T>,
        options: &[RequestOption],
    ) -> Result<(), HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        exchange_xml(self.post(url).apply_all(options), body, target).await
    }

    /// [`post_xml`](Self::post_xml) under `ctx`
    ///
    /// # Errors
    /// Returns the request error, the context error, `HttpError::XmlEncode`
    /// or `HttpError::Xml`.
    pub async fn post_xml_with_context<B, T>(
        &self,
        ctx: &RequestContext,
        url: &str,
        body: Option<&B>,
        target: Option<&mut T>,
        options: &[RequestOption],
    ) -> Result<(), HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        exchange_xml(
            self.post_with_context(ctx, url).apply_all(options),
            body,
            target,
        )
        .await
    }
}

async fn decode_csv<T: DeserializeOwned>(
    request: RequestBuilder,
    separator: u8,
) -> Result<Vec<T>, HttpError> {
    let mut resp = request.send().await?;
    resp.set_csv_separator(separator).csv().await
}

async fn exchange_json<B, T>(
    request: RequestBuilder,
    body: Option<&B>,
    target: Option<&mut T>,
) -> Result<(), HttpError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let request = match body {
        Some(body) => request.json(body),
        None => request,
    };
    let mut resp = request.send().await?;
    if let Some(target) = target {
        *target = resp.json().await?;
    }
    Ok(())
}

async fn exchange_xml<B, T>(
    request: RequestBuilder,
    body: Option<&B>,
    target: Option<&mut T>,
) -> Result<(), HttpError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let request = match body {
        Some(body) => request.xml(body),
        None => request,
    };
    let mut resp = request.send().await?;
    if let Some(target) = target {
        *target = resp.xml().await?;
    }
    Ok(())
}
