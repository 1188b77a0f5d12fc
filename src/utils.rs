use std::io::{self, Write};

use curl::easy::Easy;
use failure_derive::Fail;
use sha1::{Digest, Sha1};

/// A blocking HTTP `GET` transport.
///
/// The response body is streamed into `output` and the status code is returned as-is,
/// so callers decide what a non-200 response means.
pub trait HttpClient {
    fn get(&self, url: &str, output: &mut dyn Write) -> Result<u32, TransferError>;
}
impl<'a, C: HttpClient + ?Sized> HttpClient for &'a C {
    #[inline]
    fn get(&self, url: &str, output: &mut dyn Write) -> Result<u32, TransferError> {
        (**self).get(url, output)
    }
}

#[derive(Debug, Fail)]
pub enum TransferError {
    #[fail(display = "{}", _0)]
    Curl(#[fail(cause)] ::curl::Error),
    #[fail(display = "Unable to store response: {}", _0)]
    Io(#[fail(cause)] io::Error),
}
impl From<::curl::Error> for TransferError {
    #[inline]
    fn from(cause: ::curl::Error) -> TransferError {
        TransferError::Curl(cause)
    }
}

/// Performs requests with a fresh curl easy handle, following redirects.
#[derive(Copy, Clone, Debug, Default)]
pub struct CurlClient;
impl HttpClient for CurlClient {
    fn get(&self, url: &str, output: &mut dyn Write) -> Result<u32, TransferError> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        let mut error: Option<io::Error> = None;
        let result = {
            let mut transfer = easy.transfer();
            transfer.write_function(
                |data| if let Err(e) = output.write_all(data) {
                    error = Some(e);
                    Ok(0)
                } else {
                    Ok(data.len())
                },
            )?;
            transfer.perform()
        };
        match result {
            Err(e) => {
                if let Some(actual_error) = error.take() {
                    Err(TransferError::Io(actual_error))
                } else {
                    Err(e.into())
                }
            }
            Ok(()) => {
                debug_assert!(error.is_none());
                Ok(easy.response_code()?)
            }
        }
    }
}

#[inline]
pub(crate) fn get_buffer<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<(u32, Vec<u8>), TransferError> {
    let mut buffer = Vec::with_capacity(2048);
    let status = client.get(url, &mut buffer)?;
    Ok((status, buffer))
}

/// Passes writes through while computing the SHA-1 of everything written.
pub(crate) struct Sha1Writer<W> {
    inner: W,
    hasher: Sha1,
}
impl<W: Write> Sha1Writer<W> {
    #[inline]
    pub fn new(inner: W) -> Sha1Writer<W> {
        Sha1Writer { inner, hasher: Sha1::new() }
    }
    /// Lowercase hex digest of the bytes written so far
    pub fn finish(self) -> (W, String) {
        let digest = format!("{:x}", self.hasher.finalize());
        (self.inner, digest)
    }
}
impl<W: Write> Write for Sha1Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
