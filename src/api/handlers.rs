use actix_web::{web, HttpResponse};
use tracing::{error, info};

use crate::db::{NewCampaign, NewDonation, NewPot, PotUpdate};
use crate::error::AppError;
use crate::AppState;

pub async fn list_campaigns(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let campaigns = state.db.list_campaigns().await?;
    Ok(HttpResponse::Ok().json(campaigns))
}

pub async fn create_campaign(
    req: web::Json<NewCampaign>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received campaign creation request for: {}", req.name);
    match state.db.create_campaign(req.into_inner()).await {
        Ok(campaign) => Ok(HttpResponse::Created().json(campaign)),
        Err(e) => {
            error!("Campaign creation failed: {}", e);
            Err(e)
        }
    }
}

pub async fn list_pots(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let pots = state.db.list_pots().await?;
    Ok(HttpResponse::Ok().json(pots))
}

pub async fn get_pot(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    match state.db.get_pot(&id).await? {
        Some(pot) => Ok(HttpResponse::Ok().json(pot)),
        None => Err(AppError::NotFound(format!("pot {}", id))),
    }
}

pub async fn create_pot(
    req: web::Json<NewPot>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received pot creation request for: {}", req.title);
    let pot = state.db.create_pot(req.into_inner()).await?;
    Ok(HttpResponse::Created().json(pot))
}

pub async fn update_pot(
    path: web::Path<String>,
    req: web::Json<PotUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let pot = state.db.update_pot(&path.into_inner(), req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(pot))
}

pub async fn add_donation(
    path: web::Path<String>,
    req: web::Json<NewDonation>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let pot_id = path.into_inner();
    info!("Received donation of {} for pot {}", req.amount, pot_id);
    match state.db.add_donation(&pot_id, req.into_inner()).await {
        Ok(donation) => Ok(HttpResponse::Created().json(donation)),
        Err(e) => {
            error!("Donation to pot {} failed: {}", pot_id, e);
            Err(e)
        }
    }
}

pub async fn list_donations(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let donations = state.db.donations_for_pot(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(donations))
}
